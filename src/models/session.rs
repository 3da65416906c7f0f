//! # Session Snapshots
//!
//! A [`Session`] is the session-level [`Operation`] plus the diagnostic message
//! log, the execution settings in force and a view over the session's child
//! operations. The view is either *lazy* (re-reads the live registry on every
//! access) or *materialized* (a frozen copy); both answer the same queries.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::execution::ExecutionSettings;
use crate::metrics::{compute_metrics, SessionMetrics};

use super::message::MessageList;
use super::metadata::Metadata;
use super::operation::{Operation, OperationError, OperationUpdate};
use super::operation_id::OperationId;
use super::status::OperationStatus;

type OperationsSource<OS> = Arc<dyn Fn() -> Vec<Operation<OS>> + Send + Sync>;

/// Access path to a session's operations
pub enum OperationsView<OS> {
    /// Re-reads the live registry on every access
    Lazy(OperationsSource<OS>),
    /// Frozen copy taken at materialization time
    Materialized(Arc<[Operation<OS>]>),
}

impl<OS> Clone for OperationsView<OS> {
    fn clone(&self) -> Self {
        match self {
            Self::Lazy(source) => Self::Lazy(Arc::clone(source)),
            Self::Materialized(operations) => Self::Materialized(Arc::clone(operations)),
        }
    }
}

impl<OS> fmt::Debug for OperationsView<OS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lazy(_) => f.write_str("Lazy"),
            Self::Materialized(operations) => {
                write!(f, "Materialized({} operations)", operations.len())
            }
        }
    }
}

impl<OS> OperationsView<OS> {
    pub fn operations(&self) -> Arc<[Operation<OS>]> {
        match self {
            Self::Lazy(source) => Arc::from(source()),
            Self::Materialized(operations) => Arc::clone(operations),
        }
    }
}

/// Snapshot of a session and a view over its operations
pub struct Session<SS, OS> {
    operation: Operation<SS>,
    messages: MessageList,
    execution_settings: Option<ExecutionSettings>,
    operations: OperationsView<OS>,
}

impl<SS: Clone, OS> Clone for Session<SS, OS> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            messages: self.messages.clone(),
            execution_settings: self.execution_settings.clone(),
            operations: self.operations.clone(),
        }
    }
}

impl<SS: fmt::Debug, OS> fmt::Debug for Session<SS, OS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("operation", &self.operation)
            .field("messages", &self.messages.len())
            .field("execution_settings", &self.execution_settings)
            .field("operations", &self.operations)
            .finish()
    }
}

impl<SS, OS> Session<SS, OS> {
    /// Session whose operations are re-read from `source` on every access
    pub fn lazy(
        operation: Operation<SS>,
        messages: MessageList,
        source: impl Fn() -> Vec<Operation<OS>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            operation,
            messages,
            execution_settings: None,
            operations: OperationsView::Lazy(Arc::new(source)),
        }
    }

    /// Session over a frozen operation set
    pub fn materialized(
        operation: Operation<SS>,
        messages: MessageList,
        operations: Vec<Operation<OS>>,
    ) -> Self {
        Self {
            operation,
            messages,
            execution_settings: None,
            operations: OperationsView::Materialized(Arc::from(operations)),
        }
    }

    /// Session-level operation carrying the session state
    pub fn operation(&self) -> &Operation<SS> {
        &self.operation
    }

    pub fn id(&self) -> &OperationId {
        self.operation.id()
    }

    pub fn state(&self) -> &SS {
        self.operation.state()
    }

    pub fn status(&self) -> OperationStatus {
        self.operation.status()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.operation.started_at()
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.operation.finished_at()
    }

    pub fn exception(&self) -> Option<&OperationError> {
        self.operation.exception()
    }

    pub fn metadata(&self) -> &Metadata {
        self.operation.metadata()
    }

    pub fn duration(&self) -> Duration {
        self.operation.duration()
    }

    pub fn messages(&self) -> &MessageList {
        &self.messages
    }

    pub fn execution_settings(&self) -> Option<&ExecutionSettings> {
        self.execution_settings.as_ref()
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self.operations, OperationsView::Materialized(_))
    }

    pub fn operations(&self) -> Arc<[Operation<OS>]> {
        self.operations.operations()
    }

    pub fn operations_count(&self) -> usize {
        match &self.operations {
            OperationsView::Lazy(source) => source().len(),
            OperationsView::Materialized(operations) => operations.len(),
        }
    }

    /// Same session fields over a frozen copy of `operations`
    pub fn with_operations(&self, operations: Vec<Operation<OS>>) -> Self
    where
        SS: Clone,
    {
        Self {
            operation: self.operation.clone(),
            messages: self.messages.clone(),
            execution_settings: self.execution_settings.clone(),
            operations: OperationsView::Materialized(Arc::from(operations)),
        }
    }

    /// Freeze the current view; already materialized sessions are returned as-is
    pub fn materialize(&self) -> Self
    where
        SS: Clone,
    {
        Self {
            operation: self.operation.clone(),
            messages: self.messages.clone(),
            execution_settings: self.execution_settings.clone(),
            operations: OperationsView::Materialized(self.operations.operations()),
        }
    }

    pub fn metrics(&self) -> SessionMetrics {
        let operations = self.operations();
        compute_metrics(self, &operations)
    }
}

impl<SS, OS: Clone> Session<SS, OS> {
    pub fn get_operation(&self, id: &OperationId) -> Option<Operation<OS>> {
        self.operations()
            .iter()
            .find(|operation| operation.id() == id)
            .cloned()
    }
}

impl<SS: Clone, OS> Session<SS, OS> {
    /// Derive a new session snapshot; messages and the operations view are shared
    pub fn with(&self, update: OperationUpdate<SS>) -> Self {
        Self {
            operation: self.operation.with(update),
            messages: self.messages.clone(),
            execution_settings: self.execution_settings.clone(),
            operations: self.operations.clone(),
        }
    }

    pub fn with_state(&self, state: SS) -> Self {
        self.with(OperationUpdate::new().state(state))
    }

    pub fn with_metadata(&self, metadata: Metadata) -> Self {
        self.with(OperationUpdate::new().metadata(metadata))
    }

    pub fn with_execution_settings(&self, settings: ExecutionSettings) -> Self {
        Self {
            operation: self.operation.clone(),
            messages: self.messages.clone(),
            execution_settings: Some(settings),
            operations: self.operations.clone(),
        }
    }
}
