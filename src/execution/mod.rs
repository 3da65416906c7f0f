//! # Execution Contracts
//!
//! Executor trait and adapters, execution options, and the tracer capability
//! used for per-operation activities.

pub mod executor;
pub mod options;
pub mod tracer;

pub use executor::{
    executor_fn, extended_executor_fn, ExecutionContext, ExecutionOutcome, FnExecutor,
    OperationExecutor,
};
pub use options::{
    ExecutionOptions, ExecutionSettings, OperationFinishedCallback, SessionFinishedCallback,
};
pub use tracer::{Activity, NoopTracer, Tracer, TracingTracer};
