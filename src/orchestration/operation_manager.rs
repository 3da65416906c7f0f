//! # Operation Manager
//!
//! Owns one session: the operation registry, the session snapshot, and the
//! pipeline run started by [`OperationManager::start`].
//!
//! ## Lifecycle
//!
//! `Created → Started → Draining → Completed`. Session-level fields may only be
//! changed while `Created` (session status `NotStarted`).
//!
//! ## Run Topology
//!
//! ```text
//! registered ops → [stage 1: process_operation × max_concurrency_level] → [stage 2: notify × 1]
//!                         │
//!                         └─→ global lock (shared by every session of the SessionManager)
//! ```
//!
//! Every dispatched operation reaches `Finished`: executor errors, panics and
//! cancellation are recorded on the operation, never surfaced as stage faults.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::constants::activities;
use crate::error::{Result, SessionError};
use crate::execution::{
    Activity, ExecutionContext, ExecutionOptions, ExecutionOutcome, OperationExecutor, Tracer,
};
use crate::logging::{log_error, log_operation_event, log_session_operation};
use crate::models::{
    panic_message, MessageList, Metadata, Operation, OperationError, OperationId, OperationStatus,
    OperationUpdate, Session, SessionType, GLOBAL_WAIT_DURATION,
};
use crate::pipeline::{Pipeline, PipelineError, PipelineInput, StepSettings};

use super::session_manager::{SessionManager, SessionManagerContext};

/// Shared future resolving to the materialized session once the run finished
pub type SessionCompletion<SS, OS> = Shared<BoxFuture<'static, Result<Session<SS, OS>>>>;

/// Run state of an [`OperationManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ManagerLifecycle {
    Created = 0,
    Started = 1,
    Draining = 2,
    Completed = 3,
}

impl ManagerLifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Started,
            2 => Self::Draining,
            _ => Self::Completed,
        }
    }
}

impl std::fmt::Display for ManagerLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Started => write!(f, "Started"),
            Self::Draining => write!(f, "Draining"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

/// Scratch area for [`OperationManager::update_session`]
#[derive(Debug, Clone)]
pub struct SessionUpdateContext<SS> {
    /// Current session state
    pub state: SS,
    /// Current session metadata
    pub metadata: Metadata,
    /// Replacement state, committed when set
    pub new_state: Option<SS>,
    /// Replacement metadata, committed when set
    pub new_metadata: Option<Metadata>,
}

struct RegistryEntry<OS> {
    sequence: u64,
    operation: Arc<Operation<OS>>,
}

type Registry<OS> = Arc<DashMap<OperationId, RegistryEntry<OS>>>;

/// Per-run context shared by the pipeline stages and the driver task
struct RunContext<SS, OS> {
    options: ExecutionOptions<SS, OS>,
    executor: Arc<dyn OperationExecutor<SS, OS>>,
    cancellation: CancellationToken,
    activity: Mutex<Option<Activity>>,
}

impl<SS, OS> RunContext<SS, OS> {
    fn activity(&self) -> Activity {
        self.activity.lock().clone().unwrap_or_else(Activity::none)
    }
}

struct SessionRuntime<SS, OS> {
    context: Arc<RunContext<SS, OS>>,
    input: PipelineInput<Operation<OS>>,
    completion: SessionCompletion<SS, OS>,
}

pub struct OperationManager<SS, OS> {
    session_id: OperationId,
    manager: Arc<SessionManagerContext>,
    operations: Registry<OS>,
    sequence: AtomicU64,
    session: RwLock<Session<SS, OS>>,
    messages: MessageList,
    update_lock: tokio::sync::Mutex<()>,
    admission: Mutex<()>,
    lifecycle: AtomicU8,
    runtime: OnceLock<SessionRuntime<SS, OS>>,
}

impl<SS, OS> std::fmt::Debug for OperationManager<SS, OS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationManager")
            .field("session_id", &self.session_id)
            .field("operations", &self.operations.len())
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

impl<SS, OS> OperationManager<SS, OS> {
    pub fn session_id(&self) -> &OperationId {
        &self.session_id
    }

    pub fn lifecycle(&self) -> ManagerLifecycle {
        ManagerLifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    fn set_lifecycle(&self, lifecycle: ManagerLifecycle) {
        self.lifecycle.store(lifecycle as u8, Ordering::Release);
    }

    /// Owning session manager's shared context
    pub fn session_manager_context(&self) -> &Arc<SessionManagerContext> {
        &self.manager
    }

    pub fn operations_count(&self) -> usize {
        self.operations.len()
    }

    /// True once the linked session token was cancelled (stop, timeout or external token)
    pub fn is_cancellation_requested(&self) -> bool {
        self.runtime
            .get()
            .map(|runtime| runtime.context.cancellation.is_cancelled())
            .unwrap_or(false)
    }

    /// Cancel the run; a no-op before start and after the first call
    pub fn stop(&self) {
        if let Some(runtime) = self.runtime.get() {
            if !runtime.context.cancellation.is_cancelled() {
                info!(session_id = %self.session_id, "🛑 SESSION: Stop requested");
            }
            runtime.context.cancellation.cancel();
        }
    }
}

impl<SS, OS> OperationManager<SS, OS>
where
    SS: Clone + Send + Sync + 'static,
    OS: Clone + Send + Sync + 'static,
{
    /// Create a manager bound to `session_manager`; register it with
    /// [`SessionManager::add_operation_manager`]
    pub fn new(
        session_id: OperationId,
        session_state: SS,
        session_manager: &SessionManager<SS, OS>,
        metadata: Option<Metadata>,
    ) -> Arc<Self> {
        let operations: Registry<OS> = Arc::new(DashMap::new());
        let messages = MessageList::new();
        let source = Arc::clone(&operations);
        let session = Session::lazy(
            Operation::create_not_started(session_id.clone(), session_state, metadata),
            messages.clone(),
            move || snapshot(&source),
        );

        Arc::new(Self {
            session_id,
            manager: Arc::clone(session_manager.context()),
            operations,
            sequence: AtomicU64::new(0),
            session: RwLock::new(session),
            messages,
            update_lock: tokio::sync::Mutex::new(()),
            admission: Mutex::new(()),
            lifecycle: AtomicU8::new(ManagerLifecycle::Created as u8),
            runtime: OnceLock::new(),
        })
    }

    /// Session snapshot with a lazy view over the live registry
    pub fn session(&self) -> Session<SS, OS> {
        self.session.read().clone()
    }

    /// Session snapshot over a frozen copy of the registry
    pub fn session_with_operations(&self) -> Session<SS, OS> {
        self.session().materialize()
    }

    pub fn metadata(&self) -> Metadata {
        self.session.read().metadata().clone()
    }

    pub fn messages(&self) -> &MessageList {
        &self.messages
    }

    /// Register (or overwrite) an operation in `NotStarted` status.
    ///
    /// While an infinite run is accepting input the operation is also queued
    /// for processing; otherwise it is only registered.
    pub fn create_operation(
        &self,
        id: OperationId,
        state: OS,
        metadata: Option<Metadata>,
    ) -> Operation<OS> {
        let operation = Operation::create_not_started(id.clone(), state, metadata);

        let _admission = self.admission.lock();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.operations.insert(
            id,
            RegistryEntry {
                sequence,
                operation: Arc::new(operation.clone()),
            },
        );

        if let Some(runtime) = self.runtime.get() {
            let accepting = runtime.context.options.session_type == SessionType::InfiniteProcess
                && self.lifecycle() == ManagerLifecycle::Started;
            if accepting && runtime.input.post(operation.clone()) {
                debug!(
                    session_id = %self.session_id,
                    operation_id = %operation.id(),
                    "📥 SESSION: Operation queued into running session"
                );
            }
        }

        operation
    }

    pub fn get_operation(&self, id: &OperationId) -> Option<Operation<OS>> {
        self.operations
            .get(id)
            .map(|entry| (*entry.operation).clone())
    }

    /// Snapshot of every registered operation in registration order
    pub fn get_operations(&self) -> Vec<Operation<OS>> {
        snapshot(&self.operations)
    }

    /// Replace the stored operation for `id`
    pub fn update_operation(&self, id: &OperationId, replacement: Operation<OS>) -> Result<()> {
        let mut entry = self
            .operations
            .get_mut(id)
            .ok_or_else(|| SessionError::OperationDoesNotExists {
                operation_id: id.clone(),
            })?;

        if replacement.id() != id {
            return Err(SessionError::OperationIdDoesNotMatch {
                provided: replacement.id().clone(),
                existing: id.clone(),
            });
        }

        let next = reconcile(entry.operation.as_ref(), replacement);
        entry.operation = Arc::new(next);
        Ok(())
    }

    /// Derive and store a new operation from the current one.
    ///
    /// `update` may run more than once: a concurrent writer between read and
    /// swap makes the loop re-read and re-apply, so no update is lost.
    pub fn update_operation_with<F>(&self, id: &OperationId, update: F) -> Result<Operation<OS>>
    where
        F: Fn(&Operation<OS>) -> Operation<OS>,
    {
        loop {
            let current = self
                .operations
                .get(id)
                .map(|entry| Arc::clone(&entry.operation))
                .ok_or_else(|| SessionError::OperationDoesNotExists {
                    operation_id: id.clone(),
                })?;

            let next = update(current.as_ref());
            if next.id() != id {
                return Err(SessionError::OperationIdDoesNotMatch {
                    provided: next.id().clone(),
                    existing: id.clone(),
                });
            }
            let next = reconcile(current.as_ref(), next);

            let mut entry =
                self.operations
                    .get_mut(id)
                    .ok_or_else(|| SessionError::OperationDoesNotExists {
                        operation_id: id.clone(),
                    })?;
            if Arc::ptr_eq(&entry.operation, &current) {
                entry.operation = Arc::new(next.clone());
                return Ok(next);
            }
            debug!(
                session_id = %self.session_id,
                operation_id = %id,
                "🔁 SESSION: Concurrent operation update, retrying"
            );
        }
    }

    pub fn delete_operation(&self, id: &OperationId) -> Option<Operation<OS>> {
        self.operations
            .remove(id)
            .map(|(_, entry)| (*entry.operation).clone())
    }

    /// Change session state or metadata before the run starts
    pub async fn update_session<F>(&self, update: F) -> Result<Session<SS, OS>>
    where
        F: FnOnce(&mut SessionUpdateContext<SS>),
    {
        let _guard = self.update_lock.lock().await;

        let current = self.session();
        if current.status() != OperationStatus::NotStarted {
            return Err(SessionError::SessionUpdateIsProhibited {
                session_id: self.session_id.clone(),
                session_status: current.status().to_string(),
            });
        }

        let mut context = SessionUpdateContext {
            state: current.state().clone(),
            metadata: current.metadata().clone(),
            new_state: None,
            new_metadata: None,
        };
        update(&mut context);

        let mut changes = OperationUpdate::new();
        if let Some(state) = context.new_state {
            changes = changes.state(state);
        }
        if let Some(metadata) = context.new_metadata {
            changes = changes.metadata(metadata);
        }

        let mut session = self.session.write();
        *session = session.with(changes);
        Ok(session.clone())
    }

    /// Completion handle of the current run
    pub fn session_completion(&self) -> Result<SessionCompletion<SS, OS>> {
        self.runtime
            .get()
            .map(|runtime| runtime.completion.clone())
            .ok_or_else(|| SessionError::SessionIsNotStarted {
                session_id: self.session_id.clone(),
            })
    }

    /// Start processing the registered operations
    pub async fn start(
        self: &Arc<Self>,
        options: ExecutionOptions<SS, OS>,
    ) -> Result<SessionCompletion<SS, OS>> {
        let _guard = self.update_lock.lock().await;

        if self.lifecycle() != ManagerLifecycle::Created {
            return Err(SessionError::SessionIsAlreadyStarted {
                session_id: self.session_id.clone(),
            });
        }
        options.validate()?;
        let executor = options.executor.clone().ok_or_else(|| {
            SessionError::InvalidArgument("ExecutionOptions must provide an executor".to_string())
        })?;

        let settings = options.settings();
        let cancellation = options
            .cancellation_token
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_default();

        {
            let mut session = self.session.write();
            *session = session
                .with(
                    OperationUpdate::new()
                        .status(OperationStatus::InProgress)
                        .started_at(Utc::now()),
                )
                .with_execution_settings(settings.clone());
        }

        let activity = self
            .manager
            .services()
            .tracer()
            .start_activity(activities::SESSION, &[("session_id", self.session_id.as_str())]);

        let run = Arc::new(RunContext {
            options,
            executor,
            cancellation: cancellation.clone(),
            activity: Mutex::new(Some(activity.clone())),
        });

        let pipeline = Pipeline::new()
            .add_step(
                {
                    let manager = Arc::clone(self);
                    let run = Arc::clone(&run);
                    move |operation: Operation<OS>| {
                        let manager = Arc::clone(&manager);
                        let run = Arc::clone(&run);
                        async move { Ok(manager.process_operation(&run, operation).await) }
                    }
                },
                StepSettings::new()
                    .with_max_parallelism(settings.max_concurrency_level)
                    .with_cancellation(cancellation.clone()),
            )
            .add_sync_action(
                {
                    let manager = Arc::clone(self);
                    let run = Arc::clone(&run);
                    move |operation: Operation<OS>| {
                        manager.notify_operation_finished(&run, &operation);
                        Ok(())
                    }
                },
                StepSettings::new(),
            );
        let input = pipeline.input();

        let (sender, receiver) = oneshot::channel::<Result<Session<SS, OS>>>();
        let session_id = self.session_id.clone();
        let completion: SessionCompletion<SS, OS> = receiver
            .map(move |received| {
                received.unwrap_or_else(|_| {
                    Err(SessionError::Internal(format!(
                        "session driver stopped before completion. SessionId: {session_id}."
                    )))
                })
            })
            .boxed()
            .shared();

        let queued = {
            let _admission = self.admission.lock();
            let runtime = SessionRuntime {
                context: Arc::clone(&run),
                input: input.clone(),
                completion: completion.clone(),
            };
            if self.runtime.set(runtime).is_err() {
                return Err(SessionError::Internal(format!(
                    "session runtime already initialized. SessionId: {}.",
                    self.session_id
                )));
            }
            self.set_lifecycle(ManagerLifecycle::Started);
            input.post_many(self.get_operations())
        };

        log_session_operation(
            "start",
            self.session_id.as_str(),
            &OperationStatus::InProgress.to_string(),
            Some(queued),
            Some(&format!(
                "max_concurrency_level={}, session_type={}",
                settings.max_concurrency_level, settings.session_type
            )),
        );

        if settings.session_type == SessionType::OperationsBatch {
            input.complete();
            self.set_lifecycle(ManagerLifecycle::Draining);
        }

        let done = CancellationToken::new();
        spawn_timeout_watcher(
            self.session_id.clone(),
            settings.session_timeout,
            cancellation.clone(),
            done.clone(),
        );

        let manager = Arc::clone(self);
        let session_type = settings.session_type;
        tokio::spawn(
            async move {
                if session_type == SessionType::InfiniteProcess {
                    run.cancellation.cancelled().await;
                    {
                        let _admission = manager.admission.lock();
                        input.complete();
                        manager.set_lifecycle(ManagerLifecycle::Draining);
                    }
                }

                let outcome = pipeline.completion().await;
                let session = manager.finish_session(&run, outcome);

                done.cancel();
                manager.set_lifecycle(ManagerLifecycle::Completed);
                let _ = sender.send(Ok(session));
            }
            .instrument(activity.span().clone()),
        );

        Ok(completion)
    }

    /// Stage 1 body for a single operation
    async fn process_operation(
        &self,
        run: &RunContext<SS, OS>,
        dispatched: Operation<OS>,
    ) -> Operation<OS> {
        let operation_id = dispatched.id().clone();
        let activity = run
            .activity()
            .start_activity(activities::OPERATION, &[("operation_id", operation_id.as_str())]);

        let current = match self.update_operation_with(&operation_id, Operation::mark_in_progress)
        {
            Ok(current) => current,
            Err(error) => {
                self.record_registry_error(&operation_id, &error);
                dispatched.mark_in_progress()
            }
        };

        log_operation_event(
            "dispatched",
            self.session_id.as_str(),
            operation_id.as_str(),
            &current.status().to_string(),
            None,
            None,
        );

        let wait_activity = activity.start_activity(activities::WAIT_EXECUTION, &[]);
        let wait_started = tokio::time::Instant::now();
        let global_lock = Arc::clone(self.manager.global_lock());
        let permit = tokio::select! {
            biased;
            _ = run.cancellation.cancelled() => Err(OperationError::Cancelled),
            permit = global_lock.acquire_owned() => permit.map_err(|_| OperationError::Executor {
                message: "global lock closed".to_string(),
            }),
        };
        let waited = wait_started.elapsed();
        drop(wait_activity);

        let current = current.with_metadata(
            current
                .metadata()
                .with_value(GLOBAL_WAIT_DURATION, waited.as_millis() as u64),
        );

        let processed = match permit {
            Err(exception) => current.with_exception(exception),
            Ok(permit) => {
                let execution = activity.start_activity(activities::EXECUTION, &[]);
                let span = execution.span().clone();
                let context = ExecutionContext {
                    session: self.session(),
                    operation: current.clone(),
                    cancellation: run.cancellation.clone(),
                    tracer: execution,
                };

                let executor = Arc::clone(&run.executor);
                let result = AssertUnwindSafe(
                    async move { executor.execute(context).await }.instrument(span),
                )
                .catch_unwind()
                .await;

                // global slot is released whatever the executor did
                drop(permit);

                match result {
                    Ok(Ok(outcome)) => apply_outcome(&current, outcome),
                    Ok(Err(error)) => {
                        current.with_exception(OperationError::from_executor_error(&error))
                    }
                    Err(panic) => current.with_exception(OperationError::from_panic(panic)),
                }
            }
        };

        let finished = processed.mark_finished();
        if let Err(error) = self.update_operation(&operation_id, finished.clone()) {
            self.record_registry_error(&operation_id, &error);
        }

        let exception = finished.exception().map(ToString::to_string);
        log_operation_event(
            "finished",
            self.session_id.as_str(),
            operation_id.as_str(),
            &finished.status_with_error().to_string(),
            Some(finished.duration().as_millis() as u64),
            exception.as_deref(),
        );

        finished
    }

    /// Stage 2 body
    fn notify_operation_finished(&self, run: &RunContext<SS, OS>, operation: &Operation<OS>) {
        if !operation.is_finished() {
            return;
        }
        if let Some(callback) = &run.options.on_operation_finished {
            let session = self.session();
            self.invoke_callback("OnOperationFinished", || callback(&session, operation));
        }
    }

    fn finish_session(
        &self,
        run: &RunContext<SS, OS>,
        outcome: std::result::Result<(), PipelineError>,
    ) -> Session<SS, OS> {
        let cancelled =
            run.cancellation.is_cancelled() || matches!(outcome, Err(PipelineError::Cancelled));

        let mut update = OperationUpdate::new()
            .status(OperationStatus::Finished)
            .finished_at(Utc::now());
        if let Err(PipelineError::Faulted(fault)) = &outcome {
            error!(
                session_id = %self.session_id,
                error = %fault,
                "❌ SESSION: Pipeline faulted"
            );
            self.messages
                .add_error(format!("Session pipeline faulted: {fault:#}"));
            update = update.exception(OperationError::from_executor_error(fault));
        }

        let finished = {
            let mut session = self.session.write();
            *session = session.with(update);
            session.clone()
        };

        // disposes the session activity once stage workers released their clones
        run.activity.lock().take();

        let snapshot = finished.materialize();
        let status = if cancelled { "Finished (cancelled)" } else { "Finished" };
        log_session_operation(
            "finish",
            self.session_id.as_str(),
            status,
            Some(snapshot.operations_count()),
            Some(&format!("duration_ms={}", snapshot.duration().as_millis())),
        );

        if let Some(callback) = &run.options.on_session_finished {
            self.invoke_callback("OnSessionFinished", || callback(&snapshot));
        }

        snapshot
    }

    /// Run a user callback; errors and panics go to the message log
    fn invoke_callback(&self, name: &str, callback: impl FnOnce() -> anyhow::Result<()>) {
        let failure = match std::panic::catch_unwind(AssertUnwindSafe(callback)) {
            Ok(Ok(())) => return,
            Ok(Err(error)) => format!("{error:#}"),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };

        log_error("operation_manager", name, &failure, Some(self.session_id.as_str()));
        self.messages
            .add_error(format!("{name} callback failed: {failure}"));
    }

    fn record_registry_error(&self, operation_id: &OperationId, error: &SessionError) {
        log_error(
            "operation_manager",
            "update_operation",
            &error.to_string(),
            Some(&format!("session_id={}, operation_id={operation_id}", self.session_id)),
        );
        self.messages.add_error(error.to_string());
    }
}

fn snapshot<OS: Clone>(registry: &DashMap<OperationId, RegistryEntry<OS>>) -> Vec<Operation<OS>> {
    let mut entries: Vec<(u64, Operation<OS>)> = registry
        .iter()
        .map(|entry| (entry.sequence, (*entry.operation).clone()))
        .collect();
    entries.sort_by_key(|(sequence, _)| *sequence);
    entries.into_iter().map(|(_, operation)| operation).collect()
}

/// Keep status monotonic across whole-operation replacements
fn reconcile<OS: Clone>(stored: &Operation<OS>, replacement: Operation<OS>) -> Operation<OS> {
    if replacement.status() >= stored.status() {
        return replacement;
    }

    warn!(
        operation_id = %stored.id(),
        stored = %stored.status(),
        requested = %replacement.status(),
        "Replacement would regress operation status, keeping stored status"
    );
    let mut update = OperationUpdate::new().status(stored.status());
    if replacement.started_at().is_none() {
        if let Some(at) = stored.started_at() {
            update = update.started_at(at);
        }
    }
    if replacement.finished_at().is_none() {
        if let Some(at) = stored.finished_at() {
            update = update.finished_at(at);
        }
    }
    replacement.with(update)
}

fn apply_outcome<OS: Clone>(
    current: &Operation<OS>,
    outcome: ExecutionOutcome<OS>,
) -> Operation<OS> {
    match outcome {
        ExecutionOutcome::Unchanged => current.clone(),
        ExecutionOutcome::NewState(state) => current.with_state(state),
        ExecutionOutcome::Replaced(replacement) if replacement.id() != current.id() => {
            current.with_exception(OperationError::Rejected {
                message: format!(
                    "executor returned operation {} for operation {}",
                    replacement.id(),
                    current.id()
                ),
            })
        }
        ExecutionOutcome::Replaced(replacement) => {
            let mut update = OperationUpdate::new()
                .metadata(current.metadata().merged_with(replacement.metadata()));
            if replacement.started_at().is_none() {
                if let Some(at) = current.started_at() {
                    update = update.started_at(at);
                }
            }
            if replacement.status() < current.status() {
                update = update.status(current.status());
            }
            replacement.with(update)
        }
    }
}

fn spawn_timeout_watcher(
    session_id: OperationId,
    timeout: std::time::Duration,
    cancellation: CancellationToken,
    done: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                warn!(
                    session_id = %session_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "⏱️ SESSION: Session timeout reached, cancelling"
                );
                cancellation.cancel();
            }
            _ = cancellation.cancelled() => {}
            _ = done.cancelled() => {}
        }
    });
}
