//! # Operation Snapshots
//!
//! An [`Operation`] is an immutable snapshot of one unit of work. State changes
//! are expressed by deriving a new snapshot with [`Operation::with`], so readers
//! holding an older snapshot never observe a partial update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use super::metadata::Metadata;
use super::operation_id::OperationId;
use super::status::{OperationStatus, OperationStatusWithError};

/// Failure captured on an operation. The operation still reaches `Finished`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum OperationError {
    /// Executor returned an error
    #[error("{message}")]
    Executor { message: String },
    /// Cancellation was observed before or during execution
    #[error("Operation was cancelled")]
    Cancelled,
    /// Executor panicked
    #[error("Executor panicked: {message}")]
    Panicked { message: String },
    /// Executor produced a result the engine refused to store
    #[error("Executor result rejected: {message}")]
    Rejected { message: String },
}

impl OperationError {
    /// Keep an `OperationError` found in the chain, otherwise wrap the rendered error
    pub fn from_executor_error(error: &anyhow::Error) -> Self {
        if let Some(operation_error) = error.downcast_ref::<OperationError>() {
            return operation_error.clone();
        }
        Self::Executor {
            message: format!("{error:#}"),
        }
    }

    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::Panicked {
            message: panic_message(payload.as_ref()),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Text carried by a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Field overrides for [`Operation::with`]; `None` keeps the source value
#[derive(Debug, Clone)]
pub struct OperationUpdate<S> {
    pub id: Option<OperationId>,
    pub state: Option<S>,
    pub status: Option<OperationStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exception: Option<OperationError>,
    pub metadata: Option<Metadata>,
}

impl<S> Default for OperationUpdate<S> {
    fn default() -> Self {
        Self {
            id: None,
            state: None,
            status: None,
            started_at: None,
            finished_at: None,
            exception: None,
            metadata: None,
        }
    }
}

impl<S> OperationUpdate<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: OperationId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn state(mut self, state: S) -> Self {
        self.state = Some(state);
        self
    }

    pub fn status(mut self, status: OperationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.finished_at = Some(at);
        self
    }

    pub fn exception(mut self, exception: OperationError) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Immutable snapshot of one unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation<S> {
    id: OperationId,
    state: S,
    status: OperationStatus,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    exception: Option<OperationError>,
    metadata: Metadata,
}

impl<S> Operation<S> {
    /// New operation in `NotStarted` status with unset timestamps
    pub fn create_not_started(id: OperationId, state: S, metadata: Option<Metadata>) -> Self {
        Self {
            id,
            state,
            status: OperationStatus::NotStarted,
            started_at: None,
            finished_at: None,
            exception: None,
            metadata: metadata.unwrap_or_default(),
        }
    }

    pub fn id(&self) -> &OperationId {
        &self.id
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn into_state(self) -> S {
        self.state
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn exception(&self) -> Option<&OperationError> {
        self.exception.as_ref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn is_finished(&self) -> bool {
        self.status == OperationStatus::Finished
    }

    /// Finished with a captured exception
    pub fn is_failed(&self) -> bool {
        self.is_finished() && self.exception.is_some()
    }

    pub fn status_with_error(&self) -> OperationStatusWithError {
        match self.status {
            OperationStatus::NotStarted => OperationStatusWithError::NotStarted,
            OperationStatus::InProgress => OperationStatusWithError::InProgress,
            OperationStatus::Finished if self.exception.is_some() => {
                OperationStatusWithError::Failed
            }
            OperationStatus::Finished => OperationStatusWithError::Success,
        }
    }

    /// Elapsed time between start and finish.
    ///
    /// An unfinished operation measures up to now; an operation that never
    /// started reports zero.
    pub fn duration(&self) -> Duration {
        let finished_at = self.finished_at.unwrap_or_else(Utc::now);
        let started_at = self.started_at.unwrap_or(finished_at);
        (finished_at - started_at).to_std().unwrap_or_default()
    }

    pub fn global_wait_duration(&self) -> Duration {
        self.metadata.global_wait_duration()
    }
}

impl<S: Clone> Operation<S> {
    /// Derive a new snapshot with the provided fields replaced.
    ///
    /// Status never moves backwards: a regressing status request keeps the
    /// current status.
    pub fn with(&self, update: OperationUpdate<S>) -> Self {
        let status = match update.status {
            Some(requested) if requested < self.status => {
                warn!(
                    operation_id = %self.id,
                    current = %self.status,
                    requested = %requested,
                    "Ignoring operation status regression"
                );
                self.status
            }
            Some(requested) => requested,
            None => self.status,
        };

        Self {
            id: update.id.unwrap_or_else(|| self.id.clone()),
            state: update.state.unwrap_or_else(|| self.state.clone()),
            status,
            started_at: update.started_at.or(self.started_at),
            finished_at: update.finished_at.or(self.finished_at),
            exception: update.exception.or_else(|| self.exception.clone()),
            metadata: update.metadata.unwrap_or_else(|| self.metadata.clone()),
        }
    }

    pub fn with_state(&self, state: S) -> Self {
        self.with(OperationUpdate::new().state(state))
    }

    pub fn with_status(&self, status: OperationStatus) -> Self {
        self.with(OperationUpdate::new().status(status))
    }

    pub fn with_exception(&self, exception: OperationError) -> Self {
        self.with(OperationUpdate::new().exception(exception))
    }

    pub fn with_metadata(&self, metadata: Metadata) -> Self {
        self.with(OperationUpdate::new().metadata(metadata))
    }

    /// Mark as dispatched now
    pub fn mark_in_progress(&self) -> Self {
        self.with(
            OperationUpdate::new()
                .status(OperationStatus::InProgress)
                .started_at(Utc::now()),
        )
    }

    /// Mark as finished now
    pub fn mark_finished(&self) -> Self {
        self.with(
            OperationUpdate::new()
                .status(OperationStatus::Finished)
                .finished_at(Utc::now()),
        )
    }
}

impl<S> fmt::Display for Operation<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id: {}, Status: {}", self.id, self.status)?;
        if let Some(exception) = &self.exception {
            write!(f, ", Exception: {exception}")?;
        }
        Ok(())
    }
}
