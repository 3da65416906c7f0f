//! Configuration Error Types
//!
//! Errors raised while loading and validating session manager configuration.

use thiserror::Error;

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;

/// Configuration-related errors with detailed context
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// Configuration file could not be read or parsed
    #[error("Parse Error for file {file_path}: {reason}")]
    ParseError { file_path: String, reason: String },

    /// Environment variable override could not be applied
    #[error("Environment override error for key {key}: {reason}")]
    EnvironmentOverrideError { key: String, reason: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Configuration validation errors
    #[error("Configuration validation failed: {error}")]
    ValidationError { error: String },
}

impl ConfigurationError {
    pub fn parse_error<P: Into<String>, E: std::fmt::Display>(file_path: P, reason: E) -> Self {
        Self::ParseError {
            file_path: file_path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn environment_override_error<K: Into<String>, E: std::fmt::Display>(
        key: K,
        reason: E,
    ) -> Self {
        Self::EnvironmentOverrideError {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value<F: Into<String>, V: Into<String>, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    /// Create a validation error
    pub fn validation_error<E: Into<String>>(error: E) -> Self {
        Self::ValidationError {
            error: error.into(),
        }
    }
}
