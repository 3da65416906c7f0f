//! # Session Manager Configuration
//!
//! Settings owned by a [`crate::orchestration::SessionManager`]: its id, the
//! global concurrency level shared by every session it manages, and the
//! retention settings of cache-backed session storage.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_sessions::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // TOML file first, then TASKER_SESSIONS__* environment overrides
//! let config = ConfigLoader::new()
//!     .with_optional_file("config/tasker-sessions.toml")
//!     .load()?;
//!
//! assert!(config.max_concurrency_level > 0);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::constants::{processor_count, DEFAULT_CACHE_MAX_CAPACITY, DEFAULT_SESSION_TTL};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionManagerConfig {
    /// Session manager identifier
    pub id: String,
    /// Global concurrency level shared by every session of the manager
    pub max_concurrency_level: usize,
    /// Time-to-live for sessions held by cache storage
    pub session_ttl_seconds: u64,
    /// Maximum number of sessions held by cache storage
    pub cache_max_capacity: u64,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            max_concurrency_level: processor_count(),
            session_ttl_seconds: DEFAULT_SESSION_TTL.as_secs(),
            cache_max_capacity: DEFAULT_CACHE_MAX_CAPACITY,
        }
    }
}

impl SessionManagerConfig {
    /// Defaults plus `TASKER_SESSIONS__*` environment overrides
    pub fn from_env() -> ConfigResult<Self> {
        ConfigLoader::new().load()
    }

    pub fn with_max_concurrency_level(mut self, level: usize) -> Self {
        self.max_concurrency_level = level;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl_seconds = ttl.as_secs();
        self
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.id.trim().is_empty() {
            return Err(ConfigurationError::validation_error(
                "id must not be empty",
            ));
        }
        if self.max_concurrency_level == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_concurrency_level",
                "0",
                "must be greater than 0",
            ));
        }
        if self.max_concurrency_level > Semaphore::MAX_PERMITS {
            return Err(ConfigurationError::invalid_value(
                "max_concurrency_level",
                self.max_concurrency_level.to_string(),
                format!("must not exceed {}", Semaphore::MAX_PERMITS),
            ));
        }
        if self.session_ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "session_ttl_seconds",
                "0",
                "must be greater than 0",
            ));
        }
        if self.cache_max_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache_max_capacity",
                "0",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionManagerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session_ttl(), Duration::from_secs(2 * 24 * 60 * 60));
        assert_eq!(config.max_concurrency_level, processor_count());
        assert!(uuid::Uuid::parse_str(&config.id).is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let config = SessionManagerConfig::default().with_max_concurrency_level(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { ref field, .. })
                if field == "max_concurrency_level"
        ));
    }

    #[test]
    fn test_validation_rejects_zero_ttl() {
        let config = SessionManagerConfig::default().with_session_ttl(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
