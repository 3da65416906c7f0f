//! # Engine Constants
//!
//! Defaults and well-known names shared across the session engine.

use std::time::Duration;

/// Default timeout for an entire session run
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Default time-to-live for sessions kept in cache storage
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// Default maximum number of sessions held by cache storage
pub const DEFAULT_CACHE_MAX_CAPACITY: u64 = 10_000;

/// ETA reported while no operation has finished yet: one day minus one second
pub const ESTIMATION_SENTINEL: Duration = Duration::from_secs(24 * 60 * 60 - 1);

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "TASKER_SESSIONS";

/// Environment variable selecting the runtime environment
pub const ENVIRONMENT_VAR: &str = "TASKER_SESSIONS_ENV";

/// Metadata key names
pub mod metadata_keys {
    /// Time an operation waited on the global lock, in milliseconds
    pub const GLOBAL_WAIT_DURATION: &str = "GlobalWaitDuration";
    /// Global concurrency level of the owning session manager
    pub const GLOBAL_CONCURRENCY_LEVEL: &str = "GlobalConcurrencyLevel";
}

/// Activity names used by the session tracer
pub mod activities {
    pub const SESSION: &str = "Session";
    pub const OPERATION: &str = "Operation";
    pub const WAIT_EXECUTION: &str = "WaitExecution";
    pub const EXECUTION: &str = "Execution";
}

/// Number of logical processors, falling back to one
pub fn processor_count() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}
