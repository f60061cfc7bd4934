//! Session token lifecycle: issue, resolve, revoke.
//!
//! Per token the lifecycle is `Active -> Expired -> Absent`. Expiry is a
//! fixed TTL from issue time (not sliding). Expired sessions are removed
//! lazily the first time they are presented, and in bulk by
//! [`SessionManager::purge_expired`].
//!
//! Resolution never fails for a missing, unknown, or expired token: those
//! resolve to [`Identity::Anonymous`], which is a valid browsing state. Only
//! store failures are errors.

use crate::error::Result;
use crate::store::SessionStore;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Default session lifetime: 12 hours (seconds).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 12 * 3600;

/// A persisted login session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque 128-bit random token (32 hex chars).
    pub token: String,
    pub owner: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if self.expires_at <= now {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Still stored but past `expires_at`.
    Expired,
    Absent,
}

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User(String),
}

impl Identity {
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::User(name) => Some(name),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::User(name) => f.write_str(name),
        }
    }
}

// ── Clocks ──────────────────────────────────────────────────────

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ── Manager ─────────────────────────────────────────────────────

/// Issues, validates and revokes session tokens. Holds no session state of
/// its own; every call goes to the store.
pub struct SessionManager<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    ttl: Duration,
}

impl<S: SessionStore> SessionManager<S, SystemClock> {
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self::with_clock(store, ttl, SystemClock)
    }
}

impl<S: SessionStore, C: Clock> SessionManager<S, C> {
    pub fn with_clock(store: Arc<S>, ttl: Duration, clock: C) -> Self {
        Self { store, clock, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create and persist a session for `owner`, replacing any session the
    /// owner already had. The session is only returned once stored.
    pub fn issue(&self, owner: &str) -> Result<Session> {
        let issued_at = self.clock.now();
        let session = Session {
            token: generate_token(),
            owner: owner.to_string(),
            issued_at,
            expires_at: issued_at + self.ttl,
        };

        self.store.insert(&session)?;
        tracing::info!(owner, expires_at = %session.expires_at, "Session issued");
        Ok(session)
    }

    /// Resolve a token to the identity it authenticates.
    pub fn resolve(&self, token: &str) -> Result<Identity> {
        if token.is_empty() {
            return Ok(Identity::Anonymous);
        }

        let Some(session) = self.store.find(token)? else {
            return Ok(Identity::Anonymous);
        };

        match session.state_at(self.clock.now()) {
            SessionState::Active => Ok(Identity::User(session.owner)),
            SessionState::Expired | SessionState::Absent => {
                // Best-effort cleanup; anonymous is the right answer either way.
                match self.store.delete(token) {
                    Ok(_) => {
                        tracing::debug!(owner = %session.owner, "Expired session removed");
                    }
                    Err(e) => {
                        tracing::warn!(owner = %session.owner, "Session cleanup failed: {e}");
                    }
                }
                Ok(Identity::Anonymous)
            }
        }
    }

    /// Resolve an optional token, as carried by an inbound request.
    pub fn resolve_optional(&self, token: Option<&str>) -> Result<Identity> {
        match token {
            Some(token) => self.resolve(token),
            None => Ok(Identity::Anonymous),
        }
    }

    /// Where `token` is in its lifecycle. Read-only: does not clean up.
    pub fn state(&self, token: &str) -> Result<SessionState> {
        Ok(match self.store.find(token)? {
            Some(session) => session.state_at(self.clock.now()),
            None => SessionState::Absent,
        })
    }

    /// Delete the session. Revoking an unknown token is not an error.
    pub fn revoke(&self, token: &str) -> Result<()> {
        if self.store.delete(token)? {
            tracing::info!("Session revoked");
        }
        Ok(())
    }

    /// Remove every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<u64> {
        let removed = self.store.delete_expired(self.clock.now())?;
        if removed > 0 {
            tracing::info!(removed, "Purged expired sessions");
        }
        Ok(removed)
    }
}

/// 128 random bits, hex encoded.
fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// ── Tests ───────────────────────────────────────────────────────
