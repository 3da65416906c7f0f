//! # Pipeline Stages
//!
//! One stage is a dispatcher task that pulls items FIFO from the upstream
//! channel and runs the step function on a bounded pool of spawned workers.
//!
//! ```text
//! upstream rx → [permit] → spawn(step(item)) → downstream tx
//!                  │             │
//!                  │             └─→ error / panic: record first fault, halt stage
//!                  └─→ bounded to max_parallelism workers
//! ```
//!
//! Shutdown paths:
//! - upstream closed: every queued item is dispatched, in-flight workers are
//!   joined, the downstream channel closes
//! - cancellation or fault: dispatching stops, queued items are abandoned,
//!   in-flight workers are joined and their outputs dropped

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::OperationError;

/// Boxed step body. `Ok(None)` consumes the item without forwarding it.
pub(crate) type StepFn<T> =
    Arc<dyn Fn(T) -> BoxFuture<'static, anyhow::Result<Option<T>>> + Send + Sync>;

/// Per-stage configuration
#[derive(Debug, Clone)]
pub struct StepSettings {
    /// Maximum number of items processed concurrently by the stage
    pub max_parallelism: usize,
    /// Token that halts the stage when cancelled
    pub cancellation: Option<CancellationToken>,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            max_parallelism: 1,
            cancellation: None,
        }
    }
}

impl StepSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values below one are raised to one
    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism.max(1);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Terminal state of one stage
#[derive(Debug)]
pub(crate) enum StageOutcome {
    Completed,
    Cancelled,
    Faulted(anyhow::Error),
}

/// First fault wins; later faults are logged and dropped
#[derive(Clone, Default)]
struct FaultSlot {
    inner: Arc<Mutex<Option<anyhow::Error>>>,
}

impl FaultSlot {
    fn record(&self, stage: usize, error: anyhow::Error, halt: &CancellationToken) {
        let mut slot = self.inner.lock();
        if slot.is_none() {
            warn!(stage = stage, error = %error, "🧱 PIPELINE: Stage faulted, halting");
            *slot = Some(error);
        } else {
            debug!(stage = stage, error = %error, "🧱 PIPELINE: Additional fault after halt");
        }
        halt.cancel();
    }

    fn take(&self) -> Option<anyhow::Error> {
        self.inner.lock().take()
    }
}

/// Spawn the dispatcher task for one stage
pub(crate) fn spawn_stage<T: Send + 'static>(
    stage: usize,
    mut upstream: mpsc::UnboundedReceiver<T>,
    downstream: mpsc::UnboundedSender<T>,
    step: StepFn<T>,
    settings: StepSettings,
) -> tokio::task::JoinHandle<StageOutcome> {
    let max_parallelism = settings.max_parallelism.max(1);
    let halt = settings
        .cancellation
        .as_ref()
        .map(CancellationToken::child_token)
        .unwrap_or_default();

    tokio::spawn(async move {
        debug!(
            stage = stage,
            max_parallelism = max_parallelism,
            "🧱 PIPELINE: Stage starting"
        );

        let permits = Arc::new(Semaphore::new(max_parallelism));
        let fault = FaultSlot::default();
        let mut workers = JoinSet::new();
        let mut dispatched: u64 = 0;

        loop {
            let permit = tokio::select! {
                biased;
                _ = halt.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let item = tokio::select! {
                biased;
                _ = halt.cancelled() => break,
                item = upstream.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            // reap finished workers so the set does not grow with the stream
            while workers.try_join_next().is_some() {}

            let step = Arc::clone(&step);
            let downstream = downstream.clone();
            let halt = halt.clone();
            let fault = fault.clone();
            dispatched += 1;

            workers.spawn(async move {
                let result = AssertUnwindSafe(async move { step(item).await })
                    .catch_unwind()
                    .await;

                // forwarding never blocks, so the slot is held until the output is queued
                match result {
                    Ok(Ok(Some(output))) => {
                        if !halt.is_cancelled() {
                            let _ = downstream.send(output);
                        }
                    }
                    Ok(Ok(None)) => {}
                    Ok(Err(error)) => fault.record(stage, error, &halt),
                    Err(panic) => fault.record(
                        stage,
                        anyhow::Error::new(OperationError::from_panic(panic)),
                        &halt,
                    ),
                }
                drop(permit);
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(join_error) = joined {
                fault.record(stage, anyhow::Error::new(join_error), &halt);
            }
        }

        // closing both ends lets upstream posts fail fast and downstream drain
        drop(upstream);
        drop(downstream);

        let outcome = match fault.take() {
            Some(error) => StageOutcome::Faulted(error),
            None if halt.is_cancelled() => StageOutcome::Cancelled,
            None => StageOutcome::Completed,
        };

        debug!(
            stage = stage,
            dispatched = dispatched,
            outcome = ?outcome,
            "🧱 PIPELINE: Stage stopped"
        );

        outcome
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallelism_is_at_least_one() {
        assert_eq!(StepSettings::new().max_parallelism, 1);
        assert_eq!(StepSettings::new().with_max_parallelism(0).max_parallelism, 1);
        assert_eq!(StepSettings::new().with_max_parallelism(8).max_parallelism, 8);
    }

    #[tokio::test]
    async fn test_stage_drains_queue_after_upstream_closes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let step: StepFn<u32> = Arc::new(|n| async move { Ok(Some(n + 1)) }.boxed());

        for n in 0..5 {
            tx.send(n).unwrap();
        }
        drop(tx);

        let handle = spawn_stage(0, rx, out_tx, step, StepSettings::new());
        assert!(matches!(handle.await.unwrap(), StageOutcome::Completed));

        let mut outputs = Vec::new();
        while let Some(n) = out_rx.recv().await {
            outputs.push(n);
        }
        assert_eq!(outputs, vec![1, 2, 3, 4, 5]);
    }
}
