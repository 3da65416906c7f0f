//! Open key/value bag attached to operations and sessions.
//!
//! Values are stored as JSON so that cross-cutting facts (global wait time,
//! concurrency levels, caller annotations) can be merged and republished without
//! knowing their concrete types. Typed access goes through [`MetadataKey`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::metadata_keys;

/// Typed handle for a metadata entry
#[derive(Debug)]
pub struct MetadataKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MetadataKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for MetadataKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for MetadataKey<T> {}

/// Milliseconds an operation spent waiting on the session manager's global lock
pub const GLOBAL_WAIT_DURATION: MetadataKey<u64> =
    MetadataKey::new(metadata_keys::GLOBAL_WAIT_DURATION);

/// Global concurrency level configured on the owning session manager
pub const GLOBAL_CONCURRENCY_LEVEL: MetadataKey<usize> =
    MetadataKey::new(metadata_keys::GLOBAL_CONCURRENCY_LEVEL);

/// Immutable metadata snapshot; every change produces a new value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Arc<BTreeMap<String, serde_json::Value>>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Typed read; `None` if absent or stored with an incompatible shape
    pub fn get_value<T: DeserializeOwned>(&self, key: MetadataKey<T>) -> Option<T> {
        self.0
            .get(key.name())
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// New snapshot with `key` set to `value`
    pub fn with_value<T: Serialize>(&self, key: MetadataKey<T>, value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => self.with_raw(key.name(), json),
            Err(_) => self.clone(),
        }
    }

    pub fn with_raw(&self, name: impl Into<String>, value: serde_json::Value) -> Self {
        let mut entries = (*self.0).clone();
        entries.insert(name.into(), value);
        Self(Arc::new(entries))
    }

    /// Union of both bags; entries of `other` win on conflict
    pub fn merged_with(&self, other: &Metadata) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        let mut entries = (*self.0).clone();
        entries.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self(Arc::new(entries))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    /// Global wait recorded on an operation, zero when never recorded
    pub fn global_wait_duration(&self) -> Duration {
        Duration::from_millis(self.get_value(GLOBAL_WAIT_DURATION).unwrap_or(0))
    }
}

impl FromIterator<(String, serde_json::Value)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_value_does_not_touch_source() {
        let original = Metadata::new();
        let updated = original.with_value(GLOBAL_WAIT_DURATION, 150);

        assert!(original.is_empty());
        assert_eq!(updated.get_value(GLOBAL_WAIT_DURATION), Some(150));
        assert_eq!(updated.global_wait_duration(), Duration::from_millis(150));
    }

    #[test]
    fn test_merge_prefers_other() {
        let base: Metadata = [
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!("base")),
        ]
        .into_iter()
        .collect();
        let other = Metadata::new().with_raw("b", json!("other"));

        let merged = base.merged_with(&other);
        assert_eq!(merged.get("a"), Some(&json!(1)));
        assert_eq!(merged.get("b"), Some(&json!("other")));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_incompatible_shape_reads_as_none() {
        let metadata = Metadata::new().with_raw(GLOBAL_WAIT_DURATION.name(), json!("soon"));
        assert_eq!(metadata.get_value(GLOBAL_WAIT_DURATION), None);
        assert_eq!(metadata.global_wait_duration(), Duration::ZERO);
    }

    #[test]
    fn test_serializes_as_plain_json_object() {
        let metadata = Metadata::new().with_value(GLOBAL_WAIT_DURATION, 25);
        let encoded = serde_json::to_value(&metadata).unwrap();
        assert_eq!(encoded, json!({ "GlobalWaitDuration": 25 }));

        let decoded: Metadata = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, metadata);
    }
}
