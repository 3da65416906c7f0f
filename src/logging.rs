//! # Structured Logging Module
//!
//! Environment-aware structured logging for session and operation lifecycles.
//! Console output is human readable unless `TASKER_SESSIONS_LOG_FORMAT=json`
//! selects JSON lines.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::constants::ENVIRONMENT_VAR;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

const LOG_FORMAT_VAR: &str = "TASKER_SESSIONS_LOG_FORMAT";

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json = use_json_format();

        let filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level))
        };

        let console = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter())
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter())
                .boxed()
        };

        // Use try_init to avoid panic if global subscriber already set
        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var(ENVIRONMENT_VAR)
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn use_json_format() -> bool {
    std::env::var(LOG_FORMAT_VAR)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log structured data for session lifecycle events
pub fn log_session_operation(
    operation: &str,
    session_id: &str,
    status: &str,
    operations_count: Option<usize>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        session_id = %session_id,
        status = %status,
        operations_count = operations_count,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 SESSION_OPERATION"
    );
}

/// Log structured data for a single operation event
pub fn log_operation_event(
    event: &str,
    session_id: &str,
    operation_id: &str,
    status: &str,
    duration_ms: Option<u64>,
    error: Option<&str>,
) {
    tracing::debug!(
        event = %event,
        session_id = %session_id,
        operation_id = %operation_id,
        status = %status,
        duration_ms = duration_ms,
        error = error,
        "🔧 OPERATION_EVENT"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_detection() {
        std::env::set_var(ENVIRONMENT_VAR, "test_override");
        let env = get_environment();
        assert_eq!(env, "test_override");
        std::env::remove_var(ENVIRONMENT_VAR);
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
    }
}
