//! # Operation Executors
//!
//! User code plugged into a session run. An executor receives an
//! [`ExecutionContext`] and reports an [`ExecutionOutcome`]: either a complete
//! replacement operation or just the new operation state. Errors are returned
//! through `anyhow`; the engine records them on the operation instead of
//! failing the session.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::models::{Operation, Session};

use super::tracer::Activity;

/// Everything an executor sees for one operation
pub struct ExecutionContext<SS, OS> {
    /// Lazy session view; operations reflect the live registry
    pub session: Session<SS, OS>,
    /// Operation snapshot as dispatched (InProgress)
    pub operation: Operation<OS>,
    /// Linked session token (timeout + external token + stop)
    pub cancellation: CancellationToken,
    /// "Execution" activity for nested spans
    pub tracer: Activity,
}

impl<SS, OS> fmt::Debug for ExecutionContext<SS, OS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("operation", &self.operation.to_string())
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

/// Result reported by an executor
#[derive(Debug)]
pub enum ExecutionOutcome<OS> {
    /// Complete replacement; must keep the dispatched operation's id
    Replaced(Operation<OS>),
    /// New state applied to the dispatched operation
    NewState(OS),
    /// Nothing changed
    Unchanged,
}

#[async_trait]
pub trait OperationExecutor<SS, OS>: Send + Sync {
    async fn execute(
        &self,
        context: ExecutionContext<SS, OS>,
    ) -> anyhow::Result<ExecutionOutcome<OS>>;
}

type BoxedExecute<SS, OS> = Box<
    dyn Fn(ExecutionContext<SS, OS>) -> BoxFuture<'static, anyhow::Result<ExecutionOutcome<OS>>>
        + Send
        + Sync,
>;

/// Executor backed by a closure, built with [`executor_fn`] or [`extended_executor_fn`]
pub struct FnExecutor<SS, OS> {
    execute: BoxedExecute<SS, OS>,
}

impl<SS, OS> fmt::Debug for FnExecutor<SS, OS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnExecutor")
    }
}

#[async_trait]
impl<SS, OS> OperationExecutor<SS, OS> for FnExecutor<SS, OS>
where
    SS: Send + Sync + 'static,
    OS: Send + Sync + 'static,
{
    async fn execute(
        &self,
        context: ExecutionContext<SS, OS>,
    ) -> anyhow::Result<ExecutionOutcome<OS>> {
        (self.execute)(context).await
    }
}

/// Executor returning a full replacement operation
pub fn executor_fn<SS, OS, F, Fut>(f: F) -> FnExecutor<SS, OS>
where
    SS: Send + Sync + 'static,
    OS: Send + Sync + 'static,
    F: Fn(Session<SS, OS>, Operation<OS>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Operation<OS>>> + Send + 'static,
{
    FnExecutor {
        execute: Box::new(move |context: ExecutionContext<SS, OS>| {
            f(context.session, context.operation, context.cancellation)
                .map(|result| result.map(ExecutionOutcome::Replaced))
                .boxed()
        }),
    }
}

/// Executor that works on the full context and returns the new state, if any
pub fn extended_executor_fn<SS, OS, F, Fut>(f: F) -> FnExecutor<SS, OS>
where
    SS: Send + Sync + 'static,
    OS: Send + Sync + 'static,
    F: Fn(ExecutionContext<SS, OS>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<OS>>> + Send + 'static,
{
    FnExecutor {
        execute: Box::new(move |context: ExecutionContext<SS, OS>| {
            f(context)
                .map(|result| {
                    result.map(|state| match state {
                        Some(state) => ExecutionOutcome::NewState(state),
                        None => ExecutionOutcome::Unchanged,
                    })
                })
                .boxed()
        }),
    }
}
