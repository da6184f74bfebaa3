//! Database handle and open/close logic
//!
//! This module provides the [`Database`] handle that ties together:
//! - the engine instance slot (present only while open)
//! - the iterator registry (weak, force-closed before the instance goes)
//! - the dispatcher that runs engine calls on worker threads
//!
//! ## State machine
//!
//! ```text
//!            open ok                 close / re-open
//! Unopened ─────────▶ Open ─────────────────────────▶ Closed
//!    ▲                 │ ▲                              │
//!    └── open failed ──┘ └──────────── open ok ─────────┘
//! ```
//!
//! Unopened and Closed behave identically. Only `open` may run without an
//! instance; everything else fails synchronously with an illegal-state error.
//!
//! ## Callbacks
//!
//! Every async method takes a completion callback invoked exactly once, on
//! the origin thread, from inside `Runtime::run` / `Runtime::poll`. Engine
//! failures arrive through the callback; argument and state errors are
//! returned immediately and the callback is dropped uncalled. Pass
//! [`discard`] when the outcome does not matter.

pub mod config;
mod instance;
mod payload;
mod registry;

pub use config::{RuntimeConfig, CONFIG_FILE_NAME};

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use quarry_core::{Error, Options, ReadOptions, Result, Slice, Status, Value, WriteOptions};
use quarry_storage::{EngineFactory, WriteBatch as EngineBatch};
use tracing::{debug, info};

use crate::batch::WriteBatch;
use crate::dispatch::Dispatcher;
use crate::iterator::{DbIterator, IteratorShared};
use instance::{Instance, Release, ReleaseToken};
use payload::{BatchRef, ClosePayload, OpenPayload, ReadPayload, WritePayload};
use registry::IteratorRegistry;

/// The most recent open, as seen by later opens and closes.
#[derive(Default)]
struct LatestOpen {
    /// Marked once that open's instance is gone (or the open failed)
    release: Option<Arc<Release>>,
    /// False once a close has superseded it
    installable: bool,
}

/// State shared between a handle, its clones, and in-flight payloads.
pub(crate) struct DatabaseShared {
    instance: RwLock<Option<Arc<Instance>>>,
    latest: Mutex<LatestOpen>,
    pub(crate) iterators: IteratorRegistry,
    pub(crate) factory: Arc<dyn EngineFactory>,
    path: Mutex<Option<PathBuf>>,
}

impl DatabaseShared {
    /// The open instance, if any. Callers hold the clone for one engine call.
    pub(crate) fn instance(&self) -> Option<Arc<Instance>> {
        self.instance.read().clone()
    }

    fn require_open(&self) -> Result<Arc<Instance>> {
        self.instance()
            .ok_or_else(|| Error::illegal_state("DB.open() has not been called"))
    }

    fn is_open(&self) -> bool {
        self.instance.read().is_some()
    }

    /// Close every registered iterator, then detach the instance.
    ///
    /// Returns the release of the most recent open. It is marked once that
    /// instance has been dropped by every in-flight operation, or once that
    /// open has failed.
    fn close_instance(&self) -> Option<Arc<Release>> {
        let forced = self.iterators.close_all();
        let detached = self.instance.write().take();
        if let Some(instance) = detached {
            let path = self.path.lock().clone();
            info!(
                target: "quarry::db",
                path = ?path,
                iterators_closed = forced,
                in_flight = Arc::strong_count(&instance) - 1,
                "Closed database"
            );
        }
        let mut latest = self.latest.lock();
        latest.installable = false;
        latest.release.clone()
    }

    /// Track a new open. Anything opened before it is now superseded.
    fn begin_open(&self) -> (Option<Arc<Release>>, ReleaseToken) {
        let previous = self.close_instance();
        let (release, token) = Release::pair();
        *self.latest.lock() = LatestOpen {
            release: Some(release),
            installable: true,
        };
        (previous, token)
    }

    /// Install `instance` unless a later open or close superseded it.
    fn install(&self, instance: Arc<Instance>, path: PathBuf) -> bool {
        let current = {
            let latest = self.latest.lock();
            latest.installable
                && latest
                    .release
                    .as_ref()
                    .is_some_and(|release| Arc::ptr_eq(release, instance.release()))
        };
        if !current {
            debug!(target: "quarry::db", path = %path.display(), "Discarding superseded instance");
            return false;
        }
        info!(target: "quarry::db", path = %path.display(), "Opened database");
        *self.path.lock() = Some(path);
        *self.instance.write() = Some(instance);
        true
    }
}

impl Drop for DatabaseShared {
    fn drop(&mut self) {
        self.close_instance();
    }
}

/// Handle to one database.
///
/// Cheap to clone; clones share the same instance. The handle (and the
/// runtime it belongs to) is bound to the thread that created it.
///
/// # Example
///
/// ```ignore
/// let runtime = Runtime::new(RuntimeConfig::default())?;
/// let db = runtime.database();
/// db.open("/tmp/db", Options::create(), |r| r.unwrap())?;
/// runtime.run();
/// db.put("Hello", "World", WriteOptions::default(), |r| r.unwrap())?;
/// db.get("Hello", ReadOptions::default(), |r| {
///     assert_eq!(r.unwrap().unwrap(), "World");
/// })?;
/// runtime.run();
/// ```
#[derive(Clone)]
pub struct Database {
    shared: Arc<DatabaseShared>,
    dispatcher: Rc<Dispatcher>,
}

impl Database {
    pub(crate) fn new(dispatcher: Rc<Dispatcher>, factory: Arc<dyn EngineFactory>) -> Self {
        Database {
            shared: Arc::new(DatabaseShared {
                instance: RwLock::new(None),
                latest: Mutex::new(LatestOpen::default()),
                iterators: IteratorRegistry::default(),
                factory,
                path: Mutex::new(None),
            }),
            dispatcher,
        }
    }

    /// Open the database at `path`.
    ///
    /// If the handle is already open, the current instance and all its
    /// iterators are closed before this call returns. The new open runs on a
    /// worker thread once operations still using the previous instance have
    /// finished with it. If the open fails the handle is left without an
    /// instance; if a later open or close supersedes it, its callback gets
    /// an illegal-state error and the instance it opened is dropped.
    pub fn open(
        &self,
        path: impl AsRef<Path>,
        options: Options,
        callback: impl FnOnce(Result<()>) + 'static,
    ) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::bad_argument("open() requires a non-empty location"));
        }
        options.validate()?;

        let (previous, token) = self.shared.begin_open();
        if previous.as_ref().is_some_and(|release| !release.is_released()) {
            debug!(target: "quarry::db", path = %path.display(), "Open queued behind previous instance");
        }

        let payload = OpenPayload {
            db: Arc::clone(&self.shared),
            path: path.to_path_buf(),
            options,
            previous,
            token: Some(token),
            status: Status::default(),
        };
        self.dispatcher.submit(payload, OpenPayload::execute, move |p| {
            let OpenPayload { db, path, status, .. } = p;
            match status.into_result() {
                Ok(Some(instance)) => {
                    if db.install(instance, path) {
                        callback(Ok(()))
                    } else {
                        callback(Err(Error::illegal_state(
                            "open was superseded by a later open or close",
                        )))
                    }
                }
                Ok(None) => callback(Err(Error::internal("open completed without an instance"))),
                Err(e) => callback(Err(e)),
            }
        })
    }

    /// Close the database. Closing a handle without an instance succeeds.
    ///
    /// Iterators are closed and the handle is detached from its instance
    /// before this call returns. The callback runs once operations still
    /// using the instance have finished and the engine has been dropped.
    pub fn close(&self, callback: impl FnOnce(Result<()>) + 'static) -> Result<()> {
        let previous = self.shared.close_instance();
        let payload = ClosePayload {
            db: Arc::clone(&self.shared),
            previous,
            status: Status::default(),
        };
        self.dispatcher.submit(payload, ClosePayload::execute, move |p| {
            callback(p.status.into_result().map(|_| ()))
        })
    }

    /// Set `key` to `value`.
    ///
    /// Keys and values of 4 GiB or more are rejected with `BadArgument`.
    pub fn put(
        &self,
        key: impl Into<Slice>,
        value: impl Into<Slice>,
        options: WriteOptions,
        callback: impl FnOnce(Result<()>) + 'static,
    ) -> Result<()> {
        self.shared.require_open()?;
        let mut batch = EngineBatch::new();
        batch.put(key.into(), value.into());
        batch.check_frame()?;
        self.submit_write(BatchRef::Ephemeral(batch), options, callback)
    }

    /// Remove `key`. Removing an absent key succeeds.
    pub fn del(
        &self,
        key: impl Into<Slice>,
        options: WriteOptions,
        callback: impl FnOnce(Result<()>) + 'static,
    ) -> Result<()> {
        self.shared.require_open()?;
        let mut batch = EngineBatch::new();
        batch.delete(key.into());
        batch.check_frame()?;
        self.submit_write(BatchRef::Ephemeral(batch), options, callback)
    }

    /// Apply `batch` atomically.
    ///
    /// The write holds its own reference to the batch, so the caller may drop
    /// or keep appending to `batch` immediately; appends made after this call
    /// are not part of this write.
    pub fn write(
        &self,
        batch: &WriteBatch,
        options: WriteOptions,
        callback: impl FnOnce(Result<()>) + 'static,
    ) -> Result<()> {
        self.shared.require_open()?;
        batch.as_engine_batch().check_frame()?;
        self.submit_write(BatchRef::Durable(batch.share()), options, callback)
    }

    fn submit_write(
        &self,
        batch: BatchRef,
        options: WriteOptions,
        callback: impl FnOnce(Result<()>) + 'static,
    ) -> Result<()> {
        if options.separate_thread {
            debug!(target: "quarry::db", "Ignoring separate_thread hint; writes always run on a worker");
        }
        let payload = WritePayload {
            db: Arc::clone(&self.shared),
            batch,
            options,
            status: Status::default(),
        };
        self.dispatcher.submit(payload, WritePayload::execute, move |p| {
            callback(p.status.into_result().map(|_| ()))
        })
    }

    /// Look up `key`.
    ///
    /// The callback receives `Ok(None)` when the key is absent, and the value
    /// as text or bytes per `options.as_buffer` otherwise.
    pub fn get(
        &self,
        key: impl Into<Slice>,
        options: ReadOptions,
        callback: impl FnOnce(Result<Option<Value>>) + 'static,
    ) -> Result<()> {
        self.shared.require_open()?;
        ignore_snapshot(&options);
        let as_buffer = options.as_buffer;
        let payload = ReadPayload {
            db: Arc::clone(&self.shared),
            key: key.into(),
            options,
            status: Status::default(),
        };
        self.dispatcher.submit(payload, ReadPayload::execute, move |p| {
            callback(
                p.status
                    .map(|raw| Value::from_raw(raw, as_buffer))
                    .into_result(),
            )
        })
    }

    /// Create an iterator over the open instance.
    pub fn new_iterator(&self, options: ReadOptions) -> Result<DbIterator> {
        let instance = self.shared.require_open()?;
        ignore_snapshot(&options);
        let id = self.shared.iterators.allocate_id();
        let cursor = instance.cursor(&options);
        let shared = Arc::new(IteratorShared::new(id, cursor, options.as_buffer));
        self.shared.iterators.register(&shared);
        debug!(target: "quarry::db", iterator = id, "Iterator created");
        Ok(DbIterator::new(shared, Arc::downgrade(&self.shared)))
    }

    /// True while an instance is installed
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Location of the most recently opened instance
    pub fn path(&self) -> Option<PathBuf> {
        self.shared.path.lock().clone()
    }

    /// Strong references to the handle state: caller handles plus payloads
    /// of outstanding operations.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    /// Iterators derived from this handle that are still alive
    pub fn live_iterators(&self) -> usize {
        self.shared.iterators.live()
    }

    /// Delete the database at `path` using this handle's engine. Does not
    /// depend on whether the handle is open.
    pub fn destroy_db(&self, path: impl AsRef<Path>, options: &Options) -> Result<()> {
        destroy_with(self.shared.factory.as_ref(), path.as_ref(), options)
    }

    /// Repair the database at `path` using this handle's engine. Does not
    /// depend on whether the handle is open.
    pub fn repair_db(&self, path: impl AsRef<Path>, options: &Options) -> Result<()> {
        repair_with(self.shared.factory.as_ref(), path.as_ref(), options)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path())
            .field("open", &self.is_open())
            .field("iterators", &self.live_iterators())
            .finish()
    }
}

fn ignore_snapshot(options: &ReadOptions) {
    if options.snapshot {
        debug!(target: "quarry::db", "Ignoring snapshot reference; reading latest state");
    }
}

pub(crate) fn destroy_with(
    factory: &dyn EngineFactory,
    path: &Path,
    options: &Options,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::bad_argument("destroy() requires a non-empty location"));
    }
    factory.destroy(path, options)
}

pub(crate) fn repair_with(factory: &dyn EngineFactory, path: &Path, options: &Options) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::bad_argument("repair() requires a non-empty location"));
    }
    factory.repair(path, options)
}

/// Callback that drops the outcome; errors are logged at debug level.
pub fn discard<T>(result: Result<T>) {
    if let Err(e) = result {
        debug!(target: "quarry::db", error = %e, "Discarded operation error");
    }
}
