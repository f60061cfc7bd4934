//! Configuration loading.
//!
//! `config.toml` is read from an explicit path or from the platform config
//! directory (e.g. `~/.config/forum-core/config.toml` on Linux). Every
//! section and key is optional; missing values take their defaults.

mod schema;

pub use schema::{AuthConfig, Config, DatabaseConfig, VoteConfig, MAX_SESSION_TTL_SECS};

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Work factors bcrypt accepts.
const BCRYPT_COSTS: std::ops::RangeInclusive<u32> = 4..=31;

/// Platform config file location, if a home directory can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "forum-core").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

impl Config {
    /// Load configuration. An explicit `path` must exist; a missing file at
    /// the default location falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (expand_tilde(p), true),
            None => match default_config_path() {
                Some(p) => (p, false),
                None => {
                    tracing::warn!("No home directory found, using default configuration");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            if explicit {
                bail!("Config file not found: {}", path.display());
            }
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_toml(&raw)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.database.path = expand_tilde(&config.database.path);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.pool_size == 0 {
            bail!("database.pool_size must be at least 1");
        }
        if self.database.path.as_os_str().is_empty() {
            bail!("database.path must not be empty");
        }
        if self.auth.session_ttl_secs == 0 {
            bail!("auth.session_ttl_secs must be positive");
        }
        if self.auth.session_ttl_secs > MAX_SESSION_TTL_SECS {
            bail!("auth.session_ttl_secs must not exceed {MAX_SESSION_TTL_SECS}");
        }
        if !BCRYPT_COSTS.contains(&self.auth.bcrypt_cost) {
            bail!(
                "auth.bcrypt_cost must be between {} and {}",
                BCRYPT_COSTS.start(),
                BCRYPT_COSTS.end()
            );
        }
        if self.votes.unit_of_work_timeout_ms == 0 {
            bail!("votes.unit_of_work_timeout_ms must be positive");
        }
        Ok(())
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}
