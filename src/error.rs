//! # Error Types
//!
//! API-misuse errors raised synchronously by management calls. These are fatal to
//! the call that raised them but never to a running pipeline. Failures raised by
//! user executors live on the operation itself (see [`crate::models::OperationError`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::ConfigurationError;
use crate::models::OperationId;

/// Closed error-code taxonomy for session and operation management calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    None,
    SessionDoesNotExists,
    SessionIsNotStarted,
    SessionIsAlreadyStarted,
    SessionUpdateIsProhibited,
    OperationDoesNotExists,
    OperationIdDoesNotMatch,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::SessionDoesNotExists => "SessionDoesNotExists",
            Self::SessionIsNotStarted => "SessionIsNotStarted",
            Self::SessionIsAlreadyStarted => "SessionIsAlreadyStarted",
            Self::SessionUpdateIsProhibited => "SessionUpdateIsProhibited",
            Self::OperationDoesNotExists => "OperationDoesNotExists",
            Self::OperationIdDoesNotMatch => "OperationIdDoesNotMatch",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("Session does not exists. SessionId: {session_id}.")]
    SessionDoesNotExists { session_id: String },

    #[error("Session is not started. SessionId: {session_id}.")]
    SessionIsNotStarted { session_id: OperationId },

    #[error("Session is already started. SessionId: {session_id}.")]
    SessionIsAlreadyStarted { session_id: OperationId },

    #[error(
        "Session update is prohibited. You can change session only in NotStarted status. \
         SessionId: {session_id}, SessionStatus: {session_status}."
    )]
    SessionUpdateIsProhibited {
        session_id: OperationId,
        session_status: String,
    },

    #[error("Operation does not exists. OperationId: {operation_id}.")]
    OperationDoesNotExists { operation_id: OperationId },

    #[error(
        "Provided OperationId does not match existing OperationId. \
         ProvidedOperationId: {provided}, ExistingOperationId: {existing}."
    )]
    OperationIdDoesNotMatch {
        provided: OperationId,
        existing: OperationId,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Error code from the closed taxonomy, `ErrorCode::None` for everything else
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SessionDoesNotExists { .. } => ErrorCode::SessionDoesNotExists,
            Self::SessionIsNotStarted { .. } => ErrorCode::SessionIsNotStarted,
            Self::SessionIsAlreadyStarted { .. } => ErrorCode::SessionIsAlreadyStarted,
            Self::SessionUpdateIsProhibited { .. } => ErrorCode::SessionUpdateIsProhibited,
            Self::OperationDoesNotExists { .. } => ErrorCode::OperationDoesNotExists,
            Self::OperationIdDoesNotMatch { .. } => ErrorCode::OperationIdDoesNotMatch,
            Self::InvalidArgument(_) | Self::Configuration(_) | Self::Internal(_) => {
                ErrorCode::None
            }
        }
    }
}

impl From<ConfigurationError> for SessionError {
    fn from(error: ConfigurationError) -> Self {
        SessionError::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
