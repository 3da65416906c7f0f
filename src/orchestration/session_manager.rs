//! # Session Manager
//!
//! Registry of [`OperationManager`]s keyed by session id. The manager owns the
//! global semaphore: every operation of every session it manages holds one of
//! its permits while inside the executor, on top of the per-session stage
//! parallelism.
//!
//! Two managers never share a semaphore, so independent limits can be built
//! side by side.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::SessionManagerConfig;
use crate::error::{Result, SessionError};
use crate::execution::{Tracer, TracingTracer};
use crate::models::{Metadata, OperationId, Session, GLOBAL_CONCURRENCY_LEVEL};

use super::operation_manager::{ManagerLifecycle, OperationManager};
use super::storage::SessionStorage;

/// Type-keyed bag of shared services available to operation managers
#[derive(Clone)]
pub struct Services {
    tracer: Arc<dyn Tracer>,
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            tracer: Arc::new(TracingTracer),
            entries: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("tracer", &self.tracer)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracer used for session and operation activities
    pub fn tracer(&self) -> &Arc<dyn Tracer> {
        &self.tracer
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Register a service, replacing any previous value of the same type
    pub fn insert<T: Any + Send + Sync>(&mut self, service: T) {
        self.entries.insert(TypeId::of::<T>(), Arc::new(service));
    }

    pub fn with<T: Any + Send + Sync>(mut self, service: T) -> Self {
        self.insert(service);
        self
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| Arc::clone(entry).downcast::<T>().ok())
    }
}

/// State shared between a [`SessionManager`] and its operation managers
#[derive(Debug)]
pub struct SessionManagerContext {
    config: SessionManagerConfig,
    global_lock: Arc<Semaphore>,
    metadata: Metadata,
    services: Services,
}

impl SessionManagerContext {
    fn new(config: SessionManagerConfig, services: Services) -> Self {
        let metadata =
            Metadata::new().with_value(GLOBAL_CONCURRENCY_LEVEL, config.max_concurrency_level);
        Self {
            global_lock: Arc::new(Semaphore::new(config.max_concurrency_level)),
            config,
            metadata,
            services,
        }
    }

    pub fn config(&self) -> &SessionManagerConfig {
        &self.config
    }

    pub fn global_lock(&self) -> &Arc<Semaphore> {
        &self.global_lock
    }

    /// Metadata merged into every registered session
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn services(&self) -> &Services {
        &self.services
    }
}

pub struct SessionManager<SS, OS> {
    context: Arc<SessionManagerContext>,
    storage: Arc<dyn SessionStorage<SS, OS>>,
}

impl<SS, OS> Clone for SessionManager<SS, OS> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<SS, OS> std::fmt::Debug for SessionManager<SS, OS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("id", &self.context.config.id)
            .field("storage", &self.storage.provider_name())
            .field("available_permits", &self.context.global_lock.available_permits())
            .finish()
    }
}

impl<SS, OS> SessionManager<SS, OS> {
    pub fn context(&self) -> &Arc<SessionManagerContext> {
        &self.context
    }

    pub fn id(&self) -> &str {
        &self.context.config.id
    }

    pub fn config(&self) -> &SessionManagerConfig {
        &self.context.config
    }

    pub fn metadata(&self) -> &Metadata {
        &self.context.metadata
    }

    pub fn services(&self) -> &Services {
        &self.context.services
    }

    pub fn global_lock(&self) -> &Arc<Semaphore> {
        &self.context.global_lock
    }

    pub fn available_global_permits(&self) -> usize {
        self.context.global_lock.available_permits()
    }

    /// True when `context` belongs to this manager
    pub fn owns(&self, context: &Arc<SessionManagerContext>) -> bool {
        Arc::ptr_eq(&self.context, context)
    }
}

impl<SS, OS> SessionManager<SS, OS>
where
    SS: Clone + Send + Sync + 'static,
    OS: Clone + Send + Sync + 'static,
{
    pub fn new<S>(config: SessionManagerConfig, storage: Arc<S>, services: Services) -> Result<Self>
    where
        S: SessionStorage<SS, OS> + 'static,
    {
        Self::with_shared_storage(config, storage, services)
    }

    pub fn with_shared_storage(
        config: SessionManagerConfig,
        storage: Arc<dyn SessionStorage<SS, OS>>,
        services: Services,
    ) -> Result<Self> {
        config.validate()?;

        info!(
            session_manager_id = %config.id,
            max_concurrency_level = config.max_concurrency_level,
            storage = storage.provider_name(),
            "🚀 SESSION_MANAGER: Created"
        );

        Ok(Self {
            context: Arc::new(SessionManagerContext::new(config, services)),
            storage,
        })
    }

    /// Create an operation manager bound to this manager and register it
    pub async fn create_operation_manager(
        &self,
        session_id: OperationId,
        session_state: SS,
        metadata: Option<Metadata>,
    ) -> Result<Arc<OperationManager<SS, OS>>> {
        let manager = OperationManager::new(session_id, session_state, self, metadata);
        self.add_operation_manager(Arc::clone(&manager)).await?;
        Ok(manager)
    }

    /// Register `manager` under its session id, replacing any previous entry
    pub async fn add_operation_manager(
        &self,
        manager: Arc<OperationManager<SS, OS>>,
    ) -> Result<()> {
        if !self.owns(manager.session_manager_context()) {
            return Err(SessionError::InvalidArgument(format!(
                "OperationManager {} belongs to a different SessionManager",
                manager.session_id()
            )));
        }

        if manager.lifecycle() == ManagerLifecycle::Created {
            let shared = self.context.metadata.clone();
            manager
                .update_session(|update| {
                    update.new_metadata = Some(shared.merged_with(&update.metadata));
                })
                .await?;
        } else {
            warn!(
                session_id = %manager.session_id(),
                lifecycle = %manager.lifecycle(),
                "⚠️ SESSION_MANAGER: Session already started, metadata left unchanged"
            );
        }

        self.storage
            .set(manager.session_id().clone(), Arc::clone(&manager));

        info!(
            session_manager_id = %self.context.config.id,
            session_id = %manager.session_id(),
            "📋 SESSION_MANAGER: Session registered"
        );
        Ok(())
    }

    pub fn get_operation_manager(
        &self,
        session_id: &OperationId,
    ) -> Option<Arc<OperationManager<SS, OS>>> {
        self.storage.get(session_id)
    }

    pub fn get_operation_manager_or_err(
        &self,
        session_id: &OperationId,
    ) -> Result<Arc<OperationManager<SS, OS>>> {
        self.get_operation_manager(session_id)
            .ok_or_else(|| SessionError::SessionDoesNotExists {
                session_id: session_id.to_string(),
            })
    }

    /// Session snapshot with a lazy operations view
    pub fn get_session(&self, session_id: &OperationId) -> Option<Session<SS, OS>> {
        self.get_operation_manager(session_id)
            .map(|manager| manager.session())
    }

    pub fn get_session_or_err(&self, session_id: &OperationId) -> Result<Session<SS, OS>> {
        self.get_operation_manager_or_err(session_id)
            .map(|manager| manager.session())
    }

    /// Session snapshot with its operations materialized
    pub fn get_session_with_operations_or_err(
        &self,
        session_id: &OperationId,
    ) -> Result<Session<SS, OS>> {
        self.get_operation_manager_or_err(session_id)
            .map(|manager| manager.session_with_operations())
    }

    /// Snapshots of every stored session, ordered by session id
    pub fn get_sessions(&self) -> Vec<Session<SS, OS>> {
        self.session_ids()
            .iter()
            .filter_map(|id| self.get_session(id))
            .collect()
    }

    /// Stored session ids, sorted
    pub fn session_ids(&self) -> Vec<OperationId> {
        let mut ids = self.storage.get_keys();
        ids.sort();
        ids
    }

    /// Stop the session's run (best effort) and remove it from storage
    pub fn delete_session(&self, session_id: &OperationId) -> Result<()> {
        let manager = self.get_operation_manager_or_err(session_id)?;
        manager.stop();
        self.storage.delete(session_id);

        info!(
            session_manager_id = %self.context.config.id,
            session_id = %session_id,
            "🗑️ SESSION_MANAGER: Session deleted"
        );
        Ok(())
    }
}
