#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Sessions
//!
//! Session and operation orchestration engine.
//!
//! ## Overview
//!
//! A *session* groups many independent units of work (*operations*) and runs
//! them through a staged, bounded-concurrency pipeline. Two ceilings compose on
//! every operation: the per-session parallelism of the processing stage and a
//! global semaphore owned by the [`orchestration::SessionManager`] and shared
//! by every session it manages. A failing or panicking operation is recorded on
//! the operation and never stops the rest of the batch.
//!
//! ## Module Organization
//!
//! - [`models`] - operations, sessions, metadata and message logs
//! - [`pipeline`] - generic N-stage worker chain
//! - [`execution`] - executor trait, execution options and tracing activities
//! - [`orchestration`] - operation manager, session manager and storage
//! - [`metrics`] - progress and throughput figures derived from a session
//! - [`config`] - session manager configuration and its loader
//! - [`error`] - management-call error taxonomy
//! - [`logging`] - structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tasker_sessions::config::SessionManagerConfig;
//! use tasker_sessions::execution::{executor_fn, ExecutionOptions};
//! use tasker_sessions::models::{Operation, OperationId};
//! use tasker_sessions::orchestration::{InMemorySessionStorage, Services, SessionManager};
//!
//! # async fn example() -> tasker_sessions::Result<()> {
//! tasker_sessions::logging::init_structured_logging();
//!
//! let session_manager: SessionManager<(), u64> = SessionManager::new(
//!     SessionManagerConfig::default().with_max_concurrency_level(8),
//!     Arc::new(InMemorySessionStorage::new()),
//!     Services::default(),
//! )?;
//!
//! let session = session_manager
//!     .create_operation_manager(OperationId::new("import")?, (), None)
//!     .await?;
//! for n in 1..=20_u64 {
//!     session.create_operation(OperationId::new(n.to_string())?, n, None);
//! }
//!
//! let options = ExecutionOptions::new()
//!     .with_max_concurrency_level(4)
//!     .with_executor(executor_fn(|_session, operation: Operation<u64>, _token| async move {
//!         let doubled = *operation.state() * 2;
//!         Ok(operation.with_state(doubled))
//!     }));
//!
//! let finished = session.start(options).await?.await?;
//! let metrics = finished.metrics();
//! println!("{} of {} finished", metrics.finished_count, metrics.operations_count);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod execution;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestration;
pub mod pipeline;

pub use config::{ConfigLoader, ConfigurationError, SessionManagerConfig};
pub use error::{ErrorCode, Result, SessionError};
pub use execution::{
    executor_fn, extended_executor_fn, ExecutionContext, ExecutionOptions, ExecutionOutcome,
    OperationExecutor, Tracer,
};
pub use metrics::{compute_metrics, SessionMetrics};
pub use models::{
    Metadata, Operation, OperationError, OperationId, OperationStatus, Session, SessionType,
};
pub use orchestration::{
    OperationManager, SessionBuilder, SessionCompletion, SessionManager, SessionStorage,
};
pub use pipeline::{Pipeline, PipelineError, PipelineInput, StepSettings};
