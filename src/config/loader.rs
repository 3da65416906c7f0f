//! Layered configuration loading
//!
//! Sources are applied in order, later sources winning:
//! 1. [`SessionManagerConfig::default`]
//! 2. an optional TOML file
//! 3. environment variables named `<PREFIX>__<FIELD>` (e.g.
//!    `TASKER_SESSIONS__MAX_CONCURRENCY_LEVEL=8`)

use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::SessionManagerConfig;
use crate::constants::ENV_PREFIX;

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    file_required: bool,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            file_required: false,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Load from a TOML file that must exist
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self.file_required = true;
        self
    }

    /// Load from a TOML file when it exists
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self.file_required = false;
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn load(&self) -> ConfigResult<SessionManagerConfig> {
        let file_label = self
            .file
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<none>".to_string());

        let mut builder = Config::builder();
        if let Some(path) = &self.file {
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(self.file_required),
            );
        }
        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder
            .build()
            .map_err(|e| ConfigurationError::parse_error(file_label.clone(), e))?;

        let config: SessionManagerConfig = raw.try_deserialize().map_err(|e| {
            ConfigurationError::environment_override_error(format!("{}__*", self.env_prefix), e)
        })?;

        config.validate()?;

        debug!(
            file = %file_label,
            env_prefix = %self.env_prefix,
            max_concurrency_level = config.max_concurrency_level,
            session_ttl_seconds = config.session_ttl_seconds,
            "🔧 CONFIG: Loaded session manager configuration"
        );

        Ok(config)
    }
}
