//! # Staged Pipeline
//!
//! Generic N-stage worker chain over a typed item, independent of operations
//! and sessions. The first stage reads from an unbounded input buffer; every
//! later stage reads the previous stage's output. Each stage runs its items on
//! a bounded pool of workers (see [`StepSettings`]).
//!
//! Completion is linked: closing the input drains stage one, which then closes
//! stage two, and so on. [`Pipeline::complete_and_wait`] reports cancellation
//! if any stage was cancelled, otherwise the first underlying fault in stage
//! order.
//!
//! Stages start as soon as they are added, so a pipeline must be built inside
//! a Tokio runtime.

mod step;

pub use step::StepSettings;

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use step::{spawn_stage, StageOutcome, StepFn};

/// Why a pipeline did not complete cleanly
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline was cancelled")]
    Cancelled,
    /// First fault raised by a stage, unwrapped
    #[error(transparent)]
    Faulted(anyhow::Error),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn fault(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Faulted(error) => Some(error),
            Self::Cancelled => None,
        }
    }
}

/// Clonable handle for feeding a pipeline
pub struct PipelineInput<T> {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<T>>>>,
}

impl<T> Clone for PipelineInput<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T> std::fmt::Debug for PipelineInput<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineInput")
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl<T> PipelineInput<T> {
    fn new(sender: mpsc::UnboundedSender<T>) -> Self {
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    /// Enqueue one item; false once the input is completed or the first stage stopped
    pub fn post(&self, item: T) -> bool {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(item).is_ok(),
            None => false,
        }
    }

    /// Enqueue items in order, returning how many were accepted
    pub fn post_many(&self, items: impl IntoIterator<Item = T>) -> usize {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return 0;
        };
        let mut accepted = 0;
        for item in items {
            if sender.send(item).is_err() {
                break;
            }
            accepted += 1;
        }
        accepted
    }

    /// Signal that no more items will arrive
    pub fn complete(&self) {
        self.sender.lock().take();
    }

    pub fn is_completed(&self) -> bool {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.is_closed(),
            None => true,
        }
    }
}

/// Ordered chain of bounded-concurrency stages
pub struct Pipeline<T> {
    input: PipelineInput<T>,
    tail: Option<mpsc::UnboundedReceiver<T>>,
    stages: Vec<JoinHandle<StageOutcome>>,
}

impl<T> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .field("input", &self.input)
            .finish()
    }
}

impl<T: Send + 'static> Default for Pipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Pipeline<T> {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            input: PipelineInput::new(sender),
            tail: Some(receiver),
            stages: Vec::new(),
        }
    }

    pub fn input(&self) -> PipelineInput<T> {
        self.input.clone()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Append an async transforming stage
    pub fn add_step<F, Fut>(self, step: F, settings: StepSettings) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let step: StepFn<T> = Arc::new(move |item| step(item).map(|r| r.map(Some)).boxed());
        self.push_stage(step, settings)
    }

    /// Append a synchronous transforming stage
    pub fn add_sync_step<F>(self, step: F, settings: StepSettings) -> Self
    where
        F: Fn(T) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let step = Arc::new(step);
        let step: StepFn<T> = Arc::new(move |item| {
            let step = Arc::clone(&step);
            async move { step(item).map(Some) }.boxed()
        });
        self.push_stage(step, settings)
    }

    /// Append an async consuming stage; later stages receive nothing
    pub fn add_action<F, Fut>(self, action: F, settings: StepSettings) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let step: StepFn<T> = Arc::new(move |item| action(item).map(|r| r.map(|()| None)).boxed());
        self.push_stage(step, settings)
    }

    /// Append a synchronous consuming stage; later stages receive nothing
    pub fn add_sync_action<F>(self, action: F, settings: StepSettings) -> Self
    where
        F: Fn(T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let action = Arc::new(action);
        let step: StepFn<T> = Arc::new(move |item| {
            let action = Arc::clone(&action);
            async move { action(item).map(|()| None) }.boxed()
        });
        self.push_stage(step, settings)
    }

    /// Take the receiver of the last stage's outputs
    ///
    /// Outputs of a trailing transforming stage accumulate here; once taken,
    /// later stages must not be added.
    pub fn take_output(&mut self) -> Option<mpsc::UnboundedReceiver<T>> {
        self.tail.take()
    }

    fn push_stage(mut self, step: StepFn<T>, settings: StepSettings) -> Self {
        let upstream = match self.tail.take() {
            Some(receiver) => receiver,
            None => {
                // output was taken; the new stage starts closed and never sees items
                let (_sender, receiver) = mpsc::unbounded_channel();
                receiver
            }
        };
        let (downstream, receiver) = mpsc::unbounded_channel();
        let stage = self.stages.len();
        self.stages
            .push(spawn_stage(stage, upstream, downstream, step, settings));
        self.tail = Some(receiver);
        self
    }

    /// Complete the input and wait for every stage to drain
    pub async fn complete_and_wait(self) -> Result<(), PipelineError> {
        self.input.complete();
        self.completion().await
    }

    /// Wait for every stage to drain without completing the input
    pub async fn completion(mut self) -> Result<(), PipelineError> {
        self.tail.take();

        let mut cancelled = false;
        let mut first_fault = None;

        for (stage, handle) in self.stages.drain(..).enumerate() {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => StageOutcome::Faulted(anyhow::Error::new(join_error)),
            };
            match outcome {
                StageOutcome::Completed => {}
                StageOutcome::Cancelled => cancelled = true,
                StageOutcome::Faulted(error) => {
                    if first_fault.is_none() {
                        first_fault = Some(error);
                    } else {
                        debug!(
                            stage = stage,
                            error = %error,
                            "🧱 PIPELINE: Suppressed later fault"
                        );
                    }
                }
            }
        }

        if cancelled {
            return Err(PipelineError::Cancelled);
        }
        match first_fault {
            Some(error) => Err(PipelineError::Faulted(error)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, thiserror::Error)]
    #[error("bad item {0}")]
    struct BadItem(u32);

    #[tokio::test]
    async fn test_items_flow_through_every_stage_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let pipeline = Pipeline::new()
            .add_step(|n: u32| async move { Ok(n * 10) }, StepSettings::new())
            .add_sync_step(|n| Ok(n + 1), StepSettings::new())
            .add_sync_action(
                move |n| {
                    sink.lock().push(n);
                    Ok(())
                },
                StepSettings::new(),
            );

        assert_eq!(pipeline.input().post_many(1..=4), 4);
        pipeline.complete_and_wait().await.unwrap();

        assert_eq!(*seen.lock(), vec![11, 21, 31, 41]);
    }

    #[tokio::test]
    async fn test_first_fault_is_surfaced_unwrapped() {
        let pipeline = Pipeline::new()
            .add_sync_step(
                |n: u32| {
                    if n == 3 {
                        Err(BadItem(n).into())
                    } else {
                        Ok(n)
                    }
                },
                StepSettings::new(),
            )
            .add_sync_action(|_| Ok(()), StepSettings::new());

        pipeline.input().post_many(1..=5);
        let error = pipeline.complete_and_wait().await.unwrap_err();

        let fault = error.fault().expect("faulted");
        assert_eq!(fault.downcast_ref::<BadItem>().map(|b| b.0), Some(3));
    }

    #[tokio::test]
    async fn test_panicking_step_faults_the_pipeline() {
        let pipeline = Pipeline::new().add_sync_action(
            |n: u32| {
                if n == 2 {
                    panic!("stage blew up");
                }
                Ok(())
            },
            StepSettings::new(),
        );

        pipeline.input().post_many([1, 2, 3]);
        let error = pipeline.complete_and_wait().await.unwrap_err();
        assert!(error.to_string().contains("stage blew up"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_wins_and_abandons_queued_items() {
        let token = CancellationToken::new();
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&processed);

        let pipeline = Pipeline::new().add_action(
            move |_: u32| {
                let counter = Arc::clone(&counter);
                async move {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            StepSettings::new()
                .with_max_parallelism(2)
                .with_cancellation(token.clone()),
        );

        pipeline.input().post_many(0..10);

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            canceller.cancel();
        });

        let error = pipeline.complete_and_wait().await.unwrap_err();
        assert!(error.is_cancelled());
        // two finished at 1s, two in flight at cancellation run to completion
        assert_eq!(processed.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallelism_bound_is_respected() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));

        let pipeline = Pipeline::new().add_action(
            move |_: u32| {
                let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            StepSettings::new().with_max_parallelism(3),
        );

        pipeline.input().post_many(0..12);
        pipeline.complete_and_wait().await.unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_post_after_complete_is_rejected() {
        let pipeline = Pipeline::new().add_sync_action(|_: u32| Ok(()), StepSettings::new());
        let input = pipeline.input();

        assert!(input.post(1));
        input.complete();
        assert!(input.is_completed());
        assert!(!input.post(2));
        assert_eq!(input.post_many([3, 4]), 0);

        pipeline.completion().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_pipeline_completes() {
        Pipeline::<u32>::new().complete_and_wait().await.unwrap();
    }
}
