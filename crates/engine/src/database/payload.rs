//! Operation payloads
//!
//! One payload per in-flight operation. Each pins the database it targets
//! and owns (or pins) every input the worker needs, so nothing it touches
//! can be freed while the operation is outstanding. The worker fills the
//! `status` slot exactly once; the origin thread consumes the payload once.

use std::path::PathBuf;
use std::sync::Arc;

use quarry_core::{Error, Options, ReadOptions, Slice, Status, WriteOptions};
use quarry_storage::WriteBatch;
use tracing::debug;

use super::instance::{Instance, Release, ReleaseToken};
use super::DatabaseShared;

fn not_open() -> Error {
    Error::illegal_state("Database was closed before the operation ran")
}

/// Wait for the instance a re-open or close detached from the handle.
fn await_release(previous: &Option<Arc<Release>>) {
    if let Some(release) = previous {
        if !release.is_released() {
            debug!(target: "quarry::db", "Waiting for in-flight operations on the previous instance");
        }
        release.wait();
    }
}

pub(crate) struct OpenPayload {
    pub db: Arc<DatabaseShared>,
    pub path: PathBuf,
    pub options: Options,
    /// Instance this open replaces; opened only after it is gone
    pub previous: Option<Arc<Release>>,
    /// Marks this open released if it fails or is dropped unopened
    pub token: Option<ReleaseToken>,
    pub status: Status<Arc<Instance>>,
}

impl OpenPayload {
    pub fn execute(&mut self) {
        await_release(&self.previous);
        self.status = match self.db.factory.open(&self.path, &self.options) {
            Ok(engine) => match self.token.take() {
                Some(token) => Status::Ok(Arc::new(Instance::new(engine, token))),
                None => Status::Failed(Error::internal("open ran twice")),
            },
            Err(e) => Status::Failed(e),
        };
    }
}

pub(crate) struct ClosePayload {
    pub db: Arc<DatabaseShared>,
    pub previous: Option<Arc<Release>>,
    pub status: Status<()>,
}

impl ClosePayload {
    /// The handle already let go of the instance on the origin thread; the
    /// worker waits for operations still holding it.
    pub fn execute(&mut self) {
        await_release(&self.previous);
        self.status = Status::Ok(());
    }
}

pub(crate) struct ReadPayload {
    pub db: Arc<DatabaseShared>,
    pub key: Slice,
    pub options: ReadOptions,
    pub status: Status<Vec<u8>>,
}

impl ReadPayload {
    pub fn execute(&mut self) {
        self.status = match self.db.instance() {
            Some(instance) => Status::from_lookup(instance.get(&self.options, &self.key)),
            None => Status::Failed(not_open()),
        };
    }
}

/// The batch a write applies.
pub(crate) enum BatchRef {
    /// Built for a single put/del; dies with the operation
    Ephemeral(WriteBatch),
    /// Caller-owned; the operation holds one reference until it completes
    Durable(Arc<WriteBatch>),
}

impl BatchRef {
    fn get(&self) -> &WriteBatch {
        match self {
            BatchRef::Ephemeral(batch) => batch,
            BatchRef::Durable(batch) => batch,
        }
    }
}

pub(crate) struct WritePayload {
    pub db: Arc<DatabaseShared>,
    pub batch: BatchRef,
    pub options: WriteOptions,
    pub status: Status<()>,
}

impl WritePayload {
    pub fn execute(&mut self) {
        self.status = match self.db.instance() {
            Some(instance) => {
                Status::from_result(instance.write(&self.options, self.batch.get()))
            }
            None => Status::Failed(not_open()),
        };
    }
}
