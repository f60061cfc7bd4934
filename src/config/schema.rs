use crate::auth::password::DEFAULT_BCRYPT_COST;
use crate::auth::DEFAULT_SESSION_TTL_SECS;
use crate::store::sqlite::{DEFAULT_BUSY_TIMEOUT, DEFAULT_POOL_SIZE};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration, read from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub votes: VoteConfig,
}

// ── Database ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite file. `~` is expanded; relative paths resolve against the
    /// working directory.
    pub path: PathBuf,
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("forum.db"),
            pool_size: DEFAULT_POOL_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT.as_millis() as u64,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

// ── Auth ────────────────────────────────────────────────────────

/// Upper bound on session lifetime: one year.
pub const MAX_SESSION_TTL_SECS: u64 = 366 * 24 * 3600;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Fixed session lifetime from login.
    pub session_ttl_secs: u64,
    pub bcrypt_cost: u32,
    pub allow_registration: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            allow_registration: true,
        }
    }
}

impl AuthConfig {
    /// Session lifetime, clamped to [`MAX_SESSION_TTL_SECS`].
    pub fn session_ttl(&self) -> chrono::Duration {
        let secs = self.session_ttl_secs.min(MAX_SESSION_TTL_SECS);
        chrono::Duration::seconds(secs as i64)
    }
}

// ── Votes ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VoteConfig {
    /// Deadline given to each toggle's unit of work.
    pub unit_of_work_timeout_ms: u64,
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            unit_of_work_timeout_ms: 3_000,
        }
    }
}

impl VoteConfig {
    pub fn unit_of_work_timeout(&self) -> Duration {
        Duration::from_millis(self.unit_of_work_timeout_ms)
    }
}
