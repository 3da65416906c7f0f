//! # Orchestration Engine
//!
//! Session and operation orchestration on top of the [`crate::pipeline`]
//! primitive.
//!
//! ## Core Components
//!
//! - **SessionManager**: registry of sessions; owns the global concurrency
//!   limit shared by all of them
//! - **OperationManager**: one session, its operation registry and its run
//! - **SessionStorage**: pluggable keyed store behind the session manager
//! - **SessionBuilder**: preconfigured session manager plus execution options
//!
//! ## Hot Path
//!
//! Each operation of a running session takes a per-session stage slot, then a
//! global slot from the session manager, runs the executor, releases the global
//! slot, is marked `Finished`, and finally reaches the notify stage that fires
//! the operation callback.

pub mod builder;
pub mod operation_manager;
pub mod session_manager;
pub mod storage;

pub use builder::SessionBuilder;
pub use operation_manager::{
    ManagerLifecycle, OperationManager, SessionCompletion, SessionUpdateContext,
};
pub use session_manager::{Services, SessionManager, SessionManagerContext};
pub use storage::{CacheSessionStorage, InMemorySessionStorage, SessionStorage};
