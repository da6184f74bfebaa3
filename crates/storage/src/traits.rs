//! Engine contract
//!
//! The async layer only ever talks to storage through these traits:
//! - [`EngineFactory`]: directory-level operations (open, destroy, repair)
//! - [`Engine`]: an open instance (point get, atomic batched write, cursors)
//! - [`Cursor`]: an ordered cursor over an open instance
//!
//! Closing an instance is dropping its last `Arc`. Cursors created from an
//! instance must be dropped before the instance is; the caller enforces that.

use std::path::Path;
use std::sync::Arc;

use quarry_core::{Options, ReadOptions, Result, WriteOptions};

use crate::batch::WriteBatch;

/// An open storage engine instance.
///
/// Implementations must be safe for concurrent reads and must serialize
/// concurrent writes internally.
pub trait Engine: Send + Sync {
    /// Point lookup. `Ok(None)` means the key is absent.
    fn get(&self, options: &ReadOptions, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Apply every mutation in `batch` atomically.
    fn write(&self, options: &WriteOptions, batch: &WriteBatch) -> Result<()>;

    /// Create a cursor positioned nowhere (not valid until sought).
    fn cursor(&self, options: &ReadOptions) -> Box<dyn Cursor>;
}

/// Ordered, bidirectional cursor over an engine instance.
pub trait Cursor: Send {
    /// True when positioned at an entry
    fn valid(&self) -> bool;

    /// Position at the first entry
    fn seek_to_first(&mut self);

    /// Position at the last entry
    fn seek_to_last(&mut self);

    /// Position at the first entry with key >= `target`
    fn seek(&mut self, target: &[u8]);

    /// Advance to the following entry
    fn next(&mut self);

    /// Step back to the preceding entry
    fn prev(&mut self);

    /// Key at the current position
    fn key(&self) -> Option<&[u8]>;

    /// Value at the current position
    fn value(&self) -> Option<&[u8]>;

    /// Any error encountered while iterating
    fn status(&self) -> Result<()>;
}

/// Directory-level entry points of an engine implementation.
pub trait EngineFactory: Send + Sync {
    /// Open (or create, per `options`) the database at `path`.
    fn open(&self, path: &Path, options: &Options) -> Result<Arc<dyn Engine>>;

    /// Delete the database at `path`. A missing database is not an error.
    fn destroy(&self, path: &Path, options: &Options) -> Result<()>;

    /// Salvage as much data as possible from a damaged database at `path`.
    fn repair(&self, path: &Path, options: &Options) -> Result<()>;
}
