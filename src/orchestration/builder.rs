//! # Session Builder
//!
//! One-stop setup for the common case: configure a session manager and a set
//! of execution options once, then create preconfigured sessions from it.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tasker_sessions::execution::executor_fn;
//! use tasker_sessions::models::{Operation, OperationId};
//! use tasker_sessions::orchestration::SessionBuilder;
//!
//! # async fn example() -> tasker_sessions::Result<()> {
//! let builder = SessionBuilder::<String, u64>::new()
//!     .with_cache_storage()
//!     .configure_session_manager(|config| config.max_concurrency_level = 4)
//!     .configure_execution(|options| {
//!         options
//!             .with_max_concurrency_level(2)
//!             .with_session_timeout(Duration::from_secs(60))
//!             .with_executor(executor_fn(
//!                 |_session, operation: Operation<u64>, _token| async move {
//!                     let doubled = *operation.state() * 2;
//!                     Ok(operation.with_state(doubled))
//!                 },
//!             ))
//!     });
//!
//! let (manager, options) = builder
//!     .create_operation_manager(OperationId::new("nightly-import")?, "import".to_string())
//!     .await?;
//! manager.create_operation(OperationId::new("chunk-1")?, 21, None);
//! let session = manager.start(options).await?.await?;
//! assert_eq!(session.operations_count(), 1);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, OnceLock};

use crate::config::SessionManagerConfig;
use crate::error::Result;
use crate::execution::{ExecutionOptions, Tracer};
use crate::models::OperationId;

use super::operation_manager::OperationManager;
use super::session_manager::{Services, SessionManager};
use super::storage::{CacheSessionStorage, InMemorySessionStorage, SessionStorage};

enum StorageChoice<SS, OS> {
    InMemory,
    Cache,
    Custom(Arc<dyn SessionStorage<SS, OS>>),
}

impl<SS, OS> Clone for StorageChoice<SS, OS> {
    fn clone(&self) -> Self {
        match self {
            Self::InMemory => Self::InMemory,
            Self::Cache => Self::Cache,
            Self::Custom(storage) => Self::Custom(Arc::clone(storage)),
        }
    }
}

pub struct SessionBuilder<SS, OS> {
    config: SessionManagerConfig,
    storage: StorageChoice<SS, OS>,
    services: Services,
    execution: ExecutionOptions<SS, OS>,
    session_manager: OnceLock<SessionManager<SS, OS>>,
}

impl<SS, OS> std::fmt::Debug for SessionBuilder<SS, OS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = match &self.storage {
            StorageChoice::InMemory => "in_memory",
            StorageChoice::Cache => "moka",
            StorageChoice::Custom(storage) => storage.provider_name(),
        };
        f.debug_struct("SessionBuilder")
            .field("config", &self.config)
            .field("storage", &storage)
            .field("execution", &self.execution)
            .field("built", &self.session_manager.get().is_some())
            .finish()
    }
}

impl<SS, OS> Default for SessionBuilder<SS, OS>
where
    SS: Clone + Send + Sync + 'static,
    OS: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<SS, OS> SessionBuilder<SS, OS>
where
    SS: Clone + Send + Sync + 'static,
    OS: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            config: SessionManagerConfig::default(),
            storage: StorageChoice::InMemory,
            services: Services::default(),
            execution: ExecutionOptions::default(),
            session_manager: OnceLock::new(),
        }
    }

    pub fn with_config(mut self, config: SessionManagerConfig) -> Self {
        self.config = config;
        self.reset()
    }

    pub fn with_storage(mut self, storage: Arc<dyn SessionStorage<SS, OS>>) -> Self {
        self.storage = StorageChoice::Custom(storage);
        self.reset()
    }

    /// Use [`CacheSessionStorage`] sized from the session manager config
    pub fn with_cache_storage(mut self) -> Self {
        self.storage = StorageChoice::Cache;
        self.reset()
    }

    pub fn with_services(mut self, services: Services) -> Self {
        self.services = services;
        self.reset()
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.services = self.services.with_tracer(tracer);
        self.reset()
    }

    pub fn configure_session_manager(
        mut self,
        configure: impl FnOnce(&mut SessionManagerConfig),
    ) -> Self {
        configure(&mut self.config);
        self.reset()
    }

    pub fn configure_execution(
        mut self,
        configure: impl FnOnce(ExecutionOptions<SS, OS>) -> ExecutionOptions<SS, OS>,
    ) -> Self {
        self.execution = configure(self.execution);
        self
    }

    pub fn execution_options(&self) -> &ExecutionOptions<SS, OS> {
        &self.execution
    }

    fn reset(mut self) -> Self {
        self.session_manager = OnceLock::new();
        self
    }

    /// Build a fresh session manager from the current settings
    pub fn build_session_manager(&self) -> Result<SessionManager<SS, OS>> {
        let storage: Arc<dyn SessionStorage<SS, OS>> = match &self.storage {
            StorageChoice::InMemory => Arc::new(InMemorySessionStorage::new()),
            StorageChoice::Cache => Arc::new(CacheSessionStorage::from_config(&self.config)),
            StorageChoice::Custom(storage) => Arc::clone(storage),
        };
        SessionManager::with_shared_storage(self.config.clone(), storage, self.services.clone())
    }

    /// Session manager shared by every session this builder creates
    pub fn session_manager(&self) -> Result<SessionManager<SS, OS>> {
        if let Some(manager) = self.session_manager.get() {
            return Ok(manager.clone());
        }
        let built = self.build_session_manager()?;
        Ok(self.session_manager.get_or_init(|| built).clone())
    }

    /// Create and register a session, returning it with this builder's execution options
    pub async fn create_operation_manager(
        &self,
        session_id: OperationId,
        session_state: SS,
    ) -> Result<(Arc<OperationManager<SS, OS>>, ExecutionOptions<SS, OS>)> {
        let manager = self
            .session_manager()?
            .create_operation_manager(session_id, session_state, None)
            .await?;
        Ok((manager, self.execution.clone()))
    }
}
