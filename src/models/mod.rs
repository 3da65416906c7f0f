pub mod message;
pub mod metadata;
pub mod operation;
pub mod operation_id;
pub mod session;
pub mod status;

// Re-export core models for easy access
pub use message::{Message, MessageList, MessageSeverity};
pub use metadata::{Metadata, MetadataKey, GLOBAL_CONCURRENCY_LEVEL, GLOBAL_WAIT_DURATION};
pub use operation::{panic_message, Operation, OperationError, OperationUpdate};
pub use operation_id::OperationId;
pub use session::{OperationsView, Session};
pub use status::{OperationStatus, OperationStatusWithError, SessionType};
