//! Service wiring: one store handle shared by authentication and voting.

use crate::auth::{Authenticator, BcryptHasher, Identity, SessionManager};
use crate::config::Config;
use crate::error::Result;
use crate::store::SqliteStore;
use crate::votes::{Disposition, TargetKind, VoteToggleEngine};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Long-lived services built once at startup and passed to every caller.
pub struct Services {
    pub store: Arc<SqliteStore>,
    pub auth: Authenticator<SqliteStore, SqliteStore>,
    pub votes: VoteToggleEngine<SqliteStore>,
    vote_timeout: Duration,
}

impl Services {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        if let Some(parent) = config.database.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Arc::new(SqliteStore::open(
            &config.database.path,
            config.database.pool_size,
            config.database.busy_timeout(),
        )?);

        let sessions = SessionManager::new(store.clone(), config.auth.session_ttl());
        let auth = Authenticator::new(
            store.clone(),
            sessions,
            Box::new(BcryptHasher::new(config.auth.bcrypt_cost)),
            config.auth.allow_registration,
        )?;
        let votes = VoteToggleEngine::new(store.clone());

        tracing::info!(
            db = %config.database.path.display(),
            pool_size = config.database.pool_size,
            "Services ready"
        );

        Ok(Self {
            store,
            auth,
            votes,
            vote_timeout: config.votes.unit_of_work_timeout(),
        })
    }

    /// Resolve an optional bearer token into an identity.
    pub fn identify(&self, token: Option<&str>) -> Result<Identity> {
        self.auth.sessions().resolve_optional(token)
    }

    /// Toggle a vote with the configured unit-of-work deadline.
    pub fn toggle_vote(
        &self,
        token: Option<&str>,
        kind: TargetKind,
        target_id: i64,
        requested: Disposition,
    ) -> Result<Option<Disposition>> {
        let identity = self.identify(token)?;
        let deadline = Instant::now() + self.vote_timeout;
        self.votes.toggle(&identity, kind, target_id, requested, deadline)
    }
}
