use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation lifecycle status. Ordering follows the only legal direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationStatus {
    /// Registered but not yet dispatched
    NotStarted,
    /// Dispatched by the pipeline
    InProgress,
    /// Executor call completed (successfully or not)
    Finished,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress)
    }
}

impl Default for OperationStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}

impl std::str::FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NotStarted" => Ok(Self::NotStarted),
            "InProgress" => Ok(Self::InProgress),
            "Finished" => Ok(Self::Finished),
            _ => Err(format!("Invalid operation status: {s}")),
        }
    }
}

/// Status flattened with the success/failure outcome for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationStatusWithError {
    NotStarted,
    InProgress,
    Success,
    Failed,
}

impl fmt::Display for OperationStatusWithError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Success => write!(f, "Success"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// How a session decides it is complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionType {
    /// Limited to the operations registered before start; completes once they drain
    OperationsBatch,
    /// Endless process accepting new operations until stopped or timed out
    InfiniteProcess,
}

impl Default for SessionType {
    fn default() -> Self {
        Self::OperationsBatch
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperationsBatch => write!(f, "OperationsBatch"),
            Self::InfiniteProcess => write!(f, "InfiniteProcess"),
        }
    }
}
