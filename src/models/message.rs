use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageSeverity {
    Information,
    Warning,
    Error,
}

impl fmt::Display for MessageSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Information => write!(f, "Information"),
            Self::Warning => write!(f, "Warning"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Single diagnostic entry in a session's message log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub severity: MessageSeverity,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(text: impl Into<String>, severity: MessageSeverity) -> Self {
        Self {
            text: text.into(),
            severity,
            timestamp: Utc::now(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(text, MessageSeverity::Information)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, MessageSeverity::Error)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.text)
    }
}

/// Append-only message log shared by every snapshot of one session
///
/// Cloning shares the underlying log; session snapshots derived with `with(...)`
/// keep appending to the same list.
#[derive(Debug, Clone, Default)]
pub struct MessageList {
    inner: Arc<Mutex<Vec<Message>>>,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, message: Message) {
        self.inner.lock().push(message);
    }

    pub fn add_info(&self, text: impl Into<String>) {
        self.add(Message::info(text));
    }

    pub fn add_warning(&self, text: impl Into<String>) {
        self.add(Message::new(text, MessageSeverity::Warning));
    }

    pub fn add_error(&self, text: impl Into<String>) {
        self.add(Message::error(text));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Copy of the log at this moment
    pub fn snapshot(&self) -> Vec<Message> {
        self.inner.lock().clone()
    }

    pub fn errors(&self) -> Vec<Message> {
        self.inner
            .lock()
            .iter()
            .filter(|message| message.severity == MessageSeverity::Error)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_log() {
        let messages = MessageList::new();
        let shared = messages.clone();

        messages.add_info("started");
        shared.add_error("callback failed");

        assert_eq!(messages.len(), 2);
        assert_eq!(shared.errors().len(), 1);
        assert_eq!(messages.snapshot()[0].text, "started");
    }
}
