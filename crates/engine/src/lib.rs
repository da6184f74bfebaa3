//! Asynchronous database layer for quarry
//!
//! This crate runs blocking engine calls off the caller's thread:
//! - Runtime: worker pool + dispatcher, the factory for database handles
//! - Database: open/close/put/del/write/get, iterators, destroy/repair
//! - WriteBatch: reusable batch, reference-counted while a write is in flight
//! - DbIterator: synchronous cursor, force-closed with its database
//!
//! Callbacks run on the thread that owns the `Runtime`, inside
//! `Runtime::run` or `Runtime::poll`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod batch;
pub mod database;
pub mod dispatch;
pub mod iterator;
pub mod runtime;

pub use background::{PoolStats, WorkerPool};
pub use batch::WriteBatch;
pub use database::{discard, Database, RuntimeConfig, CONFIG_FILE_NAME};
pub use dispatch::Dispatcher;
pub use iterator::DbIterator;
pub use runtime::{destroy_db, repair_db, Runtime};

/// Version of this crate, as published
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
