//! Iterator handle
//!
//! A [`DbIterator`] owns one engine cursor. Its state lives in an
//! `Arc<IteratorShared>` so the owning database's registry can reach it
//! weakly and force it closed before the engine instance is released.
//!
//! Movement is synchronous: cursors read the engine's in-memory view and
//! never block on I/O.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use quarry_core::{Error, Result, Value};
use quarry_storage::Cursor;
use tracing::debug;

use crate::database::DatabaseShared;

/// Iterator state shared with the registry.
pub(crate) struct IteratorShared {
    id: u64,
    cursor: Mutex<Option<Box<dyn Cursor>>>,
    as_buffer: bool,
}

impl IteratorShared {
    pub(crate) fn new(id: u64, cursor: Box<dyn Cursor>, as_buffer: bool) -> Self {
        IteratorShared {
            id,
            cursor: Mutex::new(Some(cursor)),
            as_buffer,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Release the cursor. Returns false if it was already released.
    pub(crate) fn close(&self) -> bool {
        let cursor = self.cursor.lock().take();
        cursor.is_some()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.cursor.lock().is_none()
    }

    fn with_cursor<T>(&self, f: impl FnOnce(&mut dyn Cursor) -> T) -> Result<T> {
        let mut guard = self.cursor.lock();
        match guard.as_mut() {
            Some(cursor) => Ok(f(cursor.as_mut())),
            None => Err(Error::illegal_state("Iterator is closed")),
        }
    }
}

/// Ordered cursor over an open database.
///
/// Created by [`Database::new_iterator`](crate::Database::new_iterator).
/// Closing the database, or re-opening it, closes every iterator derived
/// from it; afterwards `valid()` is false and every other call fails with an
/// illegal-state error.
///
/// ```ignore
/// let mut it = db.new_iterator(ReadOptions::default())?;
/// it.seek_to_first()?;
/// while it.valid() {
///     println!("{:?} = {:?}", it.key()?, it.value()?);
///     it.next()?;
/// }
/// ```
pub struct DbIterator {
    shared: Arc<IteratorShared>,
    db: Weak<DatabaseShared>,
}

impl DbIterator {
    pub(crate) fn new(shared: Arc<IteratorShared>, db: Weak<DatabaseShared>) -> Self {
        DbIterator { shared, db }
    }

    /// Position at the first key.
    pub fn seek_to_first(&mut self) -> Result<()> {
        self.shared.with_cursor(|c| c.seek_to_first())
    }

    /// Position at the last key.
    pub fn seek_to_last(&mut self) -> Result<()> {
        self.shared.with_cursor(|c| c.seek_to_last())
    }

    /// Position at the first key at or after `target`.
    pub fn seek(&mut self, target: impl AsRef<[u8]>) -> Result<()> {
        self.shared.with_cursor(|c| c.seek(target.as_ref()))
    }

    /// Advance one entry.
    pub fn next(&mut self) -> Result<()> {
        self.shared.with_cursor(|c| {
            if c.valid() {
                c.next()
            }
        })
    }

    /// Step back one entry.
    pub fn prev(&mut self) -> Result<()> {
        self.shared.with_cursor(|c| {
            if c.valid() {
                c.prev()
            }
        })
    }

    /// True when positioned at an entry. Always false once closed.
    pub fn valid(&self) -> bool {
        self.shared.with_cursor(|c| c.valid()).unwrap_or(false)
    }

    /// Key at the current position, as text or bytes per `as_buffer`
    pub fn key(&self) -> Result<Option<Value>> {
        let as_buffer = self.shared.as_buffer;
        self.shared
            .with_cursor(|c| c.key().map(|k| Value::from_raw(k.to_vec(), as_buffer)))
    }

    /// Value at the current position, as text or bytes per `as_buffer`
    pub fn value(&self) -> Result<Option<Value>> {
        let as_buffer = self.shared.as_buffer;
        self.shared
            .with_cursor(|c| c.value().map(|v| Value::from_raw(v.to_vec(), as_buffer)))
    }

    /// Error encountered by the underlying cursor, if any.
    pub fn status(&self) -> Result<()> {
        self.shared.with_cursor(|c| c.status())?
    }

    /// Release the cursor. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.shared.close() {
            debug!(target: "quarry::db", iterator = self.shared.id, "Iterator closed");
        }
        if let Some(db) = self.db.upgrade() {
            db.iterators.remove(self.shared.id);
        }
    }

    /// True once closed, explicitly or by the database.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl std::fmt::Debug for DbIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbIterator")
            .field("id", &self.shared.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for DbIterator {
    fn drop(&mut self) {
        self.close();
    }
}
