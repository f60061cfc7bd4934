//! Persistence contracts consumed by the session and vote components.
//!
//! The components never touch SQL directly: they speak to these traits, and
//! [`SqliteStore`] is the production implementation. Store handles are built
//! once at startup and passed in explicitly.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::auth::Session;
use crate::votes::{CounterDrift, Disposition, TargetKind, Tally};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Instant;

// ── Errors ──────────────────────────────────────────────────────

/// Failures raised by a store. Display strings never include SQL or
/// connection details; the underlying error is kept as the source.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database operation failed")]
    Database(#[from] rusqlite::Error),

    #[error("no database connection available")]
    Pool(#[from] r2d2::Error),

    #[error("unit of work deadline elapsed")]
    DeadlineElapsed,

    /// A uniqueness constraint rejected the write; names the column.
    #[error("{0} already exists")]
    Conflict(&'static str),

    /// A row the unit of work depended on changed underneath it.
    #[error("inconsistent state: {0}")]
    Inconsistent(&'static str),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

// ── Credentials ─────────────────────────────────────────────────

/// A persisted user.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create a user. The password is already hashed.
#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

pub trait CredentialStore: Send + Sync {
    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Insert a user and return its id. Fails with [`StoreError::Conflict`]
    /// when the username or email is taken.
    fn create_user(&self, user: NewUser<'_>) -> Result<i64, StoreError>;
}

// ── Sessions ────────────────────────────────────────────────────

/// Session persistence, keyed by token and by owning username.
pub trait SessionStore: Send + Sync {
    /// Persist a session, replacing any session the owner already had.
    fn insert(&self, session: &Session) -> Result<(), StoreError>;

    fn find(&self, token: &str) -> Result<Option<Session>, StoreError>;

    /// Delete by token. Returns whether a row existed.
    fn delete(&self, token: &str) -> Result<bool, StoreError>;

    /// Delete every session with `expires_at <= now`.
    fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

// ── Votes ───────────────────────────────────────────────────────

/// Vote rows and counters for one target kind, scoped to an open unit of
/// work. Every call made through a ledger commits or rolls back together.
pub trait TargetLedger {
    fn kind(&self) -> TargetKind;

    fn exists(&mut self, id: i64) -> Result<bool, StoreError>;

    fn find_vote(&mut self, actor: &str, id: i64) -> Result<Option<Disposition>, StoreError>;

    fn insert_vote(
        &mut self,
        actor: &str,
        id: i64,
        disposition: Disposition,
    ) -> Result<(), StoreError>;

    /// Remove the actor's vote. Returns whether a row was removed.
    fn delete_vote(&mut self, actor: &str, id: i64) -> Result<bool, StoreError>;

    fn adjust_counters(
        &mut self,
        id: i64,
        like_delta: i64,
        dislike_delta: i64,
    ) -> Result<(), StoreError>;

    fn increment_like(&mut self, id: i64) -> Result<(), StoreError> {
        self.adjust_counters(id, 1, 0)
    }

    fn decrement_like(&mut self, id: i64) -> Result<(), StoreError> {
        self.adjust_counters(id, -1, 0)
    }

    fn increment_dislike(&mut self, id: i64) -> Result<(), StoreError> {
        self.adjust_counters(id, 0, 1)
    }

    fn decrement_dislike(&mut self, id: i64) -> Result<(), StoreError> {
        self.adjust_counters(id, 0, -1)
    }
}

pub trait VoteStore: Send + Sync {
    /// Run `work` against the ledger for `kind` as one atomic unit of work.
    ///
    /// Commits only when `work` returns `Ok` and `deadline` has not passed;
    /// anything else rolls back with no visible effect. Concurrent units of
    /// work touching the same (actor, target) are serialized.
    fn unit_of_work<T, E, F>(&self, kind: TargetKind, deadline: Instant, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn TargetLedger) -> Result<T, E>,
        E: From<StoreError>;
}

/// Read-only projections used by rendering collaborators.
pub trait VoteQueries: Send + Sync {
    /// Counters for a target, or `None` if it does not exist.
    fn tally(&self, kind: TargetKind, id: i64) -> Result<Option<Tally>, StoreError>;

    fn disposition_of(
        &self,
        actor: &str,
        kind: TargetKind,
        id: i64,
    ) -> Result<Option<Disposition>, StoreError>;

    /// Usernames holding `disposition` on a target, oldest vote first.
    fn voters(
        &self,
        kind: TargetKind,
        id: i64,
        disposition: Disposition,
    ) -> Result<Vec<String>, StoreError>;

    /// For every comment under `post_id`, the usernames holding
    /// `disposition` on that comment.
    fn comment_voters(
        &self,
        post_id: i64,
        disposition: Disposition,
    ) -> Result<BTreeMap<i64, Vec<String>>, StoreError>;

    /// Ids of the targets of `kind` on which `actor` holds `disposition`,
    /// ascending.
    fn voted_by(
        &self,
        actor: &str,
        kind: TargetKind,
        disposition: Disposition,
    ) -> Result<Vec<i64>, StoreError>;

    /// Up to `limit` targets of `kind` with the highest counter for
    /// `disposition`. Ties go to the lower id.
    fn ranked(
        &self,
        kind: TargetKind,
        disposition: Disposition,
        limit: u32,
    ) -> Result<Vec<(i64, Tally)>, StoreError>;

    /// Targets of `kind` whose counters disagree with their vote rows.
    fn audit(&self, kind: TargetKind) -> Result<Vec<CounterDrift>, StoreError>;
}
