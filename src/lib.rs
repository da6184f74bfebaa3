//! quarry - asynchronous access layer over an embedded ordered key-value store
//!
//! A single-threaded caller opens, reads, writes and iterates a local
//! database without blocking: engine calls run on a worker pool and their
//! results come back as callbacks on the caller's thread.
//!
//! # Quick Start
//!
//! ```no_run
//! use quarry::{Options, ReadOptions, Runtime, RuntimeConfig, WriteOptions};
//!
//! let runtime = Runtime::new(RuntimeConfig::default())?;
//! let db = runtime.database();
//!
//! let handle = db.clone();
//! db.open("/tmp/quarry-hello", Options::create(), move |r| {
//!     r.unwrap();
//!     let reader = handle.clone();
//!     handle
//!         .put("Hello", "World", WriteOptions::default(), move |r| {
//!             r.unwrap();
//!             reader
//!                 .get("Hello", ReadOptions::default(), |r| {
//!                     assert_eq!(r.unwrap().unwrap(), "World");
//!                 })
//!                 .unwrap();
//!         })
//!         .unwrap();
//! })?;
//!
//! // Deliver completions until the chain above has finished.
//! runtime.run();
//! # Ok::<(), quarry::Error>(())
//! ```
//!
//! # Architecture
//!
//! - [`Runtime`] owns the worker pool and the completion queue
//! - [`Database`] submits operations; each one pins the handle until its
//!   callback has run
//! - [`WriteBatch`] is shared with in-flight writes, never copied
//! - [`DbIterator`] walks the open instance synchronously and is closed with it
//!
//! The storage engine sits behind the `Engine` trait; the bundled engine is
//! an append-only log replayed into an ordered table.

pub use quarry_core::{
    Compression, Error, ErrorKind, Options, ReadOptions, Result, Slice, Status, Value,
    WriteOptions,
};
pub use quarry_engine::{
    destroy_db, discard, repair_db, Database, DbIterator, PoolStats, Runtime, RuntimeConfig,
    WriteBatch, CONFIG_FILE_NAME, VERSION,
};
pub use quarry_storage::{Cursor, Engine, EngineFactory, LogEngineFactory};
