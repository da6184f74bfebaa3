//! Per-database registry of live iterators
//!
//! Entries are weak: the registry never keeps an iterator alive. A dropped
//! iterator removes its own entry, and `register` prunes any entry whose
//! iterator is already gone.
//!
//! `close_all` force-closes the survivors in registration order (ids are
//! allocated monotonically, so `BTreeMap` order is registration order).

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::iterator::IteratorShared;

#[derive(Default)]
pub(crate) struct IteratorRegistry {
    next_id: AtomicU64,
    entries: Mutex<BTreeMap<u64, Weak<IteratorShared>>>,
}

impl IteratorRegistry {
    /// Allocate the id the next iterator will be registered under.
    pub(crate) fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register(&self, iterator: &Arc<IteratorShared>) {
        let mut entries = self.entries.lock();
        entries.retain(|_, weak| weak.strong_count() > 0);
        entries.insert(iterator.id(), Arc::downgrade(iterator));
    }

    pub(crate) fn remove(&self, id: u64) {
        self.entries.lock().remove(&id);
    }

    /// Close every still-live iterator, oldest first. Returns how many were
    /// closed.
    pub(crate) fn close_all(&self) -> usize {
        let entries = std::mem::take(&mut *self.entries.lock());
        // Closing happens outside the lock; a dropped iterator calls `remove`.
        entries
            .into_values()
            .filter_map(|weak| weak.upgrade())
            .filter(|iterator| iterator.close())
            .count()
    }

    /// Number of iterators registered and still alive
    pub(crate) fn live(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
