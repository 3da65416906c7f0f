//! # Execution Options
//!
//! Everything a session run needs: the executor, the per-session concurrency
//! level, the session timeout and type, an optional external cancellation
//! token, and the lifecycle callbacks consumed by notification layers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::constants::{processor_count, DEFAULT_SESSION_TIMEOUT};
use crate::error::{Result, SessionError};
use crate::models::{Operation, Session, SessionType};

use super::executor::OperationExecutor;

/// Called on the notify stage for every finished operation
pub type OperationFinishedCallback<SS, OS> =
    Arc<dyn Fn(&Session<SS, OS>, &Operation<OS>) -> anyhow::Result<()> + Send + Sync>;

/// Called once with the materialized session after the pipeline drained
pub type SessionFinishedCallback<SS, OS> =
    Arc<dyn Fn(&Session<SS, OS>) -> anyhow::Result<()> + Send + Sync>;

/// Non-generic part of the options in force for a session run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Per-session parallelism of the processing stage
    pub max_concurrency_level: usize,
    /// Absolute timeout for the whole run
    pub session_timeout: Duration,
    pub session_type: SessionType,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_concurrency_level: processor_count(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            session_type: SessionType::default(),
        }
    }
}

pub struct ExecutionOptions<SS, OS> {
    pub executor: Option<Arc<dyn OperationExecutor<SS, OS>>>,
    pub max_concurrency_level: usize,
    pub session_timeout: Duration,
    pub session_type: SessionType,
    /// External token linked with the session timeout
    pub cancellation_token: Option<CancellationToken>,
    pub on_operation_finished: Option<OperationFinishedCallback<SS, OS>>,
    pub on_session_finished: Option<SessionFinishedCallback<SS, OS>>,
}

impl<SS, OS> Clone for ExecutionOptions<SS, OS> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            max_concurrency_level: self.max_concurrency_level,
            session_timeout: self.session_timeout,
            session_type: self.session_type,
            cancellation_token: self.cancellation_token.clone(),
            on_operation_finished: self.on_operation_finished.clone(),
            on_session_finished: self.on_session_finished.clone(),
        }
    }
}

impl<SS, OS> fmt::Debug for ExecutionOptions<SS, OS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("has_executor", &self.executor.is_some())
            .field("max_concurrency_level", &self.max_concurrency_level)
            .field("session_timeout", &self.session_timeout)
            .field("session_type", &self.session_type)
            .field("has_cancellation_token", &self.cancellation_token.is_some())
            .field("has_on_operation_finished", &self.on_operation_finished.is_some())
            .field("has_on_session_finished", &self.on_session_finished.is_some())
            .finish()
    }
}

impl<SS, OS> Default for ExecutionOptions<SS, OS> {
    fn default() -> Self {
        let settings = ExecutionSettings::default();
        Self {
            executor: None,
            max_concurrency_level: settings.max_concurrency_level,
            session_timeout: settings.session_timeout,
            session_type: settings.session_type,
            cancellation_token: None,
            on_operation_finished: None,
            on_session_finished: None,
        }
    }
}

impl<SS, OS> ExecutionOptions<SS, OS> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executor(mut self, executor: impl OperationExecutor<SS, OS> + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn with_shared_executor(mut self, executor: Arc<dyn OperationExecutor<SS, OS>>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_max_concurrency_level(mut self, level: usize) -> Self {
        self.max_concurrency_level = level;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_session_type(mut self, session_type: SessionType) -> Self {
        self.session_type = session_type;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    pub fn on_operation_finished(
        mut self,
        callback: impl Fn(&Session<SS, OS>, &Operation<OS>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_operation_finished = Some(Arc::new(callback));
        self
    }

    pub fn on_session_finished(
        mut self,
        callback: impl Fn(&Session<SS, OS>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_session_finished = Some(Arc::new(callback));
        self
    }

    pub fn settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            max_concurrency_level: self.max_concurrency_level,
            session_timeout: self.session_timeout,
            session_type: self.session_type,
        }
    }

    /// Check the options can drive a session run
    pub fn validate(&self) -> Result<()> {
        if self.executor.is_none() {
            return Err(SessionError::InvalidArgument(
                "ExecutionOptions must provide an executor".to_string(),
            ));
        }
        if self.max_concurrency_level == 0 {
            return Err(SessionError::InvalidArgument(
                "max_concurrency_level must be greater than 0".to_string(),
            ));
        }
        if self.session_timeout.is_zero() {
            return Err(SessionError::InvalidArgument(
                "session_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
