//! Runtime: the one place databases come from
//!
//! A `Runtime` starts the worker pool once and binds every [`Database`] it
//! creates to the same dispatcher and engine factory. Completions are
//! delivered only while the origin thread is inside [`Runtime::run`] or
//! [`Runtime::poll`].

use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use quarry_core::{Options, Result};
use quarry_storage::{EngineFactory, LogEngineFactory};
use tracing::info;

use crate::background::{PoolStats, WorkerPool};
use crate::database::{destroy_with, repair_with, Database, RuntimeConfig};
use crate::dispatch::Dispatcher;

/// Worker pool, dispatcher and engine factory for one origin thread.
pub struct Runtime {
    dispatcher: Rc<Dispatcher>,
    factory: Arc<dyn EngineFactory>,
    config: RuntimeConfig,
}

impl Runtime {
    /// Start a runtime backed by [`LogEngineFactory`].
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        Self::with_engine(config, Arc::new(LogEngineFactory))
    }

    /// Start a runtime backed by any engine.
    pub fn with_engine(config: RuntimeConfig, factory: Arc<dyn EngineFactory>) -> Result<Self> {
        config.validate()?;
        let pool = WorkerPool::new(config.workers, config.max_queue_depth)?;
        info!(
            target: "quarry::dispatch",
            workers = config.workers,
            max_queue_depth = config.max_queue_depth,
            "Runtime started"
        );
        Ok(Runtime {
            dispatcher: Rc::new(Dispatcher::new(pool)),
            factory,
            config,
        })
    }

    /// A new, unopened database handle.
    pub fn database(&self) -> Database {
        Database::new(Rc::clone(&self.dispatcher), Arc::clone(&self.factory))
    }

    /// Deliver completions until nothing is outstanding. Returns the number
    /// of callbacks run.
    pub fn run(&self) -> usize {
        self.dispatcher.run()
    }

    /// Deliver the completions already available without blocking.
    pub fn poll(&self) -> usize {
        self.dispatcher.poll()
    }

    /// Operations submitted whose callback has not finished
    pub fn pending(&self) -> usize {
        self.dispatcher.pending()
    }

    /// Worker pool metrics
    pub fn pool_stats(&self) -> PoolStats {
        self.dispatcher.pool_stats()
    }

    /// Configuration this runtime was started with
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Default open options from the configuration
    pub fn default_options(&self) -> Options {
        self.config.options.clone()
    }

    /// Delete the database at `path`. Synchronous.
    pub fn destroy_db(&self, path: impl AsRef<Path>, options: &Options) -> Result<()> {
        destroy_with(self.factory.as_ref(), path.as_ref(), options)
    }

    /// Salvage the database at `path`. Synchronous.
    pub fn repair_db(&self, path: impl AsRef<Path>, options: &Options) -> Result<()> {
        repair_with(self.factory.as_ref(), path.as_ref(), options)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Delete the database at `path` with the default engine.
pub fn destroy_db(path: impl AsRef<Path>, options: &Options) -> Result<()> {
    destroy_with(&LogEngineFactory, path.as_ref(), options)
}

/// Repair the database at `path` with the default engine.
pub fn repair_db(path: impl AsRef<Path>, options: &Options) -> Result<()> {
    repair_with(&LogEngineFactory, path.as_ref(), options)
}
