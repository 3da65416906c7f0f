use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SessionError};

/// Opaque, non-empty handle identifying an operation or a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(Arc<str>);

impl OperationId {
    /// Create an id, rejecting empty or whitespace-only values
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let value = value.as_ref();
        if value.trim().is_empty() {
            return Err(SessionError::InvalidArgument(
                "OperationId must not be empty".to_string(),
            ));
        }
        Ok(Self(Arc::from(value)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OperationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OperationId {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for OperationId {
    type Error = SessionError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl Serialize for OperationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for OperationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        OperationId::new(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_id_is_rejected() {
        assert!(OperationId::new("").is_err());
        assert!(OperationId::new("   ").is_err());
        assert!(OperationId::try_from(String::new()).is_err());
    }

    #[test]
    fn test_equality_by_value() {
        let a = OperationId::new("42").unwrap();
        let b = OperationId::try_from("42".to_string()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "42");
        assert_eq!(a.to_string(), "42");
    }

    #[test]
    fn test_deserialize_rejects_empty() {
        let parsed: std::result::Result<OperationId, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());

        let parsed: OperationId = serde_json::from_str("\"op-1\"").unwrap();
        assert_eq!(parsed.as_str(), "op-1");
    }
}
