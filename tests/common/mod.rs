//! Shared helpers for session integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tasker_sessions::config::SessionManagerConfig;
use tasker_sessions::execution::{executor_fn, ExecutionOptions, FnExecutor};
use tasker_sessions::models::{Operation, OperationError, OperationId, Session};
use tasker_sessions::orchestration::{
    InMemorySessionStorage, OperationManager, Services, SessionManager,
};
use tokio_util::sync::CancellationToken;

pub type NumberSession = OperationManager<String, u64>;

pub fn id(value: &str) -> OperationId {
    OperationId::new(value).unwrap()
}

/// Session manager with in-memory storage and the given global concurrency level
pub fn session_manager<SS, OS>(global_concurrency: usize) -> SessionManager<SS, OS>
where
    SS: Clone + Send + Sync + 'static,
    OS: Clone + Send + Sync + 'static,
{
    SessionManager::new(
        SessionManagerConfig::default().with_max_concurrency_level(global_concurrency),
        Arc::new(InMemorySessionStorage::new()),
        Services::default(),
    )
    .unwrap()
}

/// Register a session holding operations "1".."=count" whose state is their number
pub async fn numbers_session(
    manager: &SessionManager<String, u64>,
    name: &str,
    count: u64,
) -> Arc<NumberSession> {
    let session = manager
        .create_operation_manager(id(name), name.to_string(), None)
        .await
        .unwrap();
    for n in 1..=count {
        session.create_operation(id(&n.to_string()), n, None);
    }
    session
}

/// Doubles the state after `delay`; cancellation of the session ends it with an error
pub fn doubling_executor(delay: Duration) -> FnExecutor<String, u64> {
    executor_fn(
        move |_session: Session<String, u64>,
              operation: Operation<u64>,
              token: CancellationToken| async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let doubled = *operation.state() * 2;
                    Ok(operation.with_state(doubled))
                }
                _ = token.cancelled() => Err(OperationError::Cancelled.into()),
            }
        },
    )
}

pub fn doubling_options(concurrency: usize, delay: Duration) -> ExecutionOptions<String, u64> {
    ExecutionOptions::new()
        .with_max_concurrency_level(concurrency)
        .with_executor(doubling_executor(delay))
}

/// Tracks how many executors run at the same time
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

pub struct ProbeGuard {
    probe: Arc<ConcurrencyProbe>,
}

impl ConcurrencyProbe {
    pub fn enter(self: &Arc<Self>) -> ProbeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard {
            probe: Arc::clone(self),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.probe.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Executor that holds a probe slot for `delay`
pub fn probed_executor(probe: Arc<ConcurrencyProbe>, delay: Duration) -> FnExecutor<String, u64> {
    executor_fn(
        move |_session: Session<String, u64>,
              operation: Operation<u64>,
              _token: CancellationToken| {
            let probe = Arc::clone(&probe);
            async move {
                let _guard = probe.enter();
                tokio::time::sleep(delay).await;
                Ok(operation)
            }
        },
    )
}
