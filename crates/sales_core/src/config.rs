//! Process configuration.
//!
//! Settings come from an optional JSON file and from `SALES_*` environment
//! variables; environment values override file values.

use crate::logging::{default_log_level, LoggingConfig};
use crate::model::user::UpdateEventProjection;
use crate::repo::user_cache::DEFAULT_TTL;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_LOG_LEVEL: &str = "SALES_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "SALES_LOG_DIR";
pub const ENV_DB_PATH: &str = "SALES_DB_PATH";
pub const ENV_CACHE_TTL_SECS: &str = "SALES_CACHE_TTL_SECS";
pub const ENV_UPDATE_EVENT_PROJECTION: &str = "SALES_UPDATE_EVENT_PROJECTION";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{}`: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value `{value}` for {key}")]
    InvalidEnv { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    /// SQLite database file; `None` means an in-memory database.
    pub db_path: Option<PathBuf>,
    pub cache_ttl_secs: u64,
    pub update_event_projection: UpdateEventProjection,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_string(),
            log_dir: None,
            db_path: None,
            cache_ttl_secs: DEFAULT_TTL.as_secs(),
            update_event_projection: UpdateEventProjection::default(),
        }
    }
}

impl CoreConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Defaults (or `path`, when given) overlaid with the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `SALES_*` overrides resolved through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(dir) = lookup(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(value) = lookup(ENV_CACHE_TTL_SECS) {
            self.cache_ttl_secs = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    key: ENV_CACHE_TTL_SECS,
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup(ENV_UPDATE_EVENT_PROJECTION) {
            self.update_event_projection =
                serde_json::from_value(serde_json::Value::String(value.trim().to_string()))
                    .map_err(|_| ConfigError::InvalidEnv {
                        key: ENV_UPDATE_EVENT_PROJECTION,
                        value: value.clone(),
                    })?;
        }
        Ok(self)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
        }
    }
}
