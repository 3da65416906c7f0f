//! # Session Storage
//!
//! Keyed store of the operation managers owned by a
//! [`SessionManager`](super::SessionManager).
//!
//! - [`InMemorySessionStorage`]: unbounded map, entries live until deleted
//! - [`CacheSessionStorage`]: Moka cache with a time-to-live and a capacity
//!   bound; expired entries disappear on their own

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use crate::config::SessionManagerConfig;
use crate::models::OperationId;

use super::operation_manager::OperationManager;

/// Storage seam for operation managers, keyed by session id
pub trait SessionStorage<SS, OS>: Send + Sync {
    /// Insert or replace the manager stored under `id`
    fn set(&self, id: OperationId, manager: Arc<OperationManager<SS, OS>>);

    fn get(&self, id: &OperationId) -> Option<Arc<OperationManager<SS, OS>>>;

    /// Ids of every stored session, in no particular order
    fn get_keys(&self) -> Vec<OperationId>;

    /// Remove `id`; absent ids are ignored
    fn delete(&self, id: &OperationId);

    fn provider_name(&self) -> &'static str;
}

pub struct InMemorySessionStorage<SS, OS> {
    sessions: DashMap<OperationId, Arc<OperationManager<SS, OS>>>,
}

impl<SS, OS> InMemorySessionStorage<SS, OS> {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<SS, OS> Default for InMemorySessionStorage<SS, OS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<SS, OS> std::fmt::Debug for InMemorySessionStorage<SS, OS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySessionStorage")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl<SS, OS> SessionStorage<SS, OS> for InMemorySessionStorage<SS, OS>
where
    SS: Send + Sync + 'static,
    OS: Send + Sync + 'static,
{
    fn set(&self, id: OperationId, manager: Arc<OperationManager<SS, OS>>) {
        self.sessions.insert(id, manager);
    }

    fn get(&self, id: &OperationId) -> Option<Arc<OperationManager<SS, OS>>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn get_keys(&self) -> Vec<OperationId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    fn delete(&self, id: &OperationId) {
        self.sessions.remove(id);
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

/// Session storage with cache-level TTL, backed by a Moka cache
pub struct CacheSessionStorage<SS, OS> {
    cache: moka::sync::Cache<OperationId, Arc<OperationManager<SS, OS>>>,
    ttl: Duration,
}

impl<SS, OS> CacheSessionStorage<SS, OS>
where
    SS: Send + Sync + 'static,
    OS: Send + Sync + 'static,
{
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let cache = moka::sync::Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        debug!(
            max_capacity = max_capacity,
            ttl_seconds = ttl.as_secs(),
            "Moka session storage created"
        );

        Self { cache, ttl }
    }

    pub fn from_config(config: &SessionManagerConfig) -> Self {
        Self::new(config.session_ttl(), config.cache_max_capacity)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl<SS, OS> std::fmt::Debug for CacheSessionStorage<SS, OS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSessionStorage")
            .field("max_capacity", &self.cache.policy().max_capacity())
            .field("entry_count", &self.cache.entry_count())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<SS, OS> SessionStorage<SS, OS> for CacheSessionStorage<SS, OS>
where
    SS: Send + Sync + 'static,
    OS: Send + Sync + 'static,
{
    fn set(&self, id: OperationId, manager: Arc<OperationManager<SS, OS>>) {
        debug!(session_id = %id, "Session SET (moka)");
        self.cache.insert(id, manager);
    }

    fn get(&self, id: &OperationId) -> Option<Arc<OperationManager<SS, OS>>> {
        self.cache.get(id)
    }

    fn get_keys(&self) -> Vec<OperationId> {
        self.cache.iter().map(|(id, _)| id.as_ref().clone()).collect()
    }

    fn delete(&self, id: &OperationId) {
        self.cache.invalidate(id);
        debug!(session_id = %id, "Session DEL (moka)");
    }

    fn provider_name(&self) -> &'static str {
        "moka"
    }
}
