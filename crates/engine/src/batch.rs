//! Caller-owned write batch
//!
//! A [`WriteBatch`] accumulates puts and deletes for one atomic
//! [`Database::write`](crate::Database::write). Submitting a batch hands the
//! write a counted reference, not a copy: the caller keeps using the batch
//! right away. If the caller appends while a write still references the
//! batch, the append goes to a private copy (`Arc::make_mut`), so the
//! in-flight write applies exactly what was in the batch when it was
//! submitted.

use std::sync::Arc;

use quarry_core::Slice;
use quarry_storage::WriteBatch as EngineBatch;

/// Reusable, reference-counted batch of mutations.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    rep: Arc<EngineBatch>,
}

impl WriteBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a put of `key` → `value`. Bytes are pinned or copied, so the
    /// caller's buffers need not outlive the batch.
    pub fn put(&mut self, key: impl Into<Slice>, value: impl Into<Slice>) -> &mut Self {
        Arc::make_mut(&mut self.rep).put(key.into(), value.into());
        self
    }

    /// Append a delete of `key`.
    pub fn del(&mut self, key: impl Into<Slice>) -> &mut Self {
        Arc::make_mut(&mut self.rep).delete(key.into());
        self
    }

    /// Drop every mutation.
    pub fn clear(&mut self) -> &mut Self {
        match Arc::get_mut(&mut self.rep) {
            Some(rep) => rep.clear(),
            None => self.rep = Arc::new(EngineBatch::new()),
        }
        self
    }

    /// Number of mutations
    pub fn len(&self) -> usize {
        self.rep.len()
    }

    /// True when the batch holds no mutations
    pub fn is_empty(&self) -> bool {
        self.rep.is_empty()
    }

    /// Writes submitted with this batch that have not completed yet
    pub fn in_flight(&self) -> usize {
        Arc::strong_count(&self.rep) - 1
    }

    /// The engine-level batch
    pub fn as_engine_batch(&self) -> &EngineBatch {
        &self.rep
    }

    pub(crate) fn share(&self) -> Arc<EngineBatch> {
        Arc::clone(&self.rep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_storage::Mutation;

    #[test]
    fn builder_chains() {
        let mut batch = WriteBatch::new();
        batch.put("a", "1").put(vec![0u8, 1], "2").del("a");
        assert_eq!(batch.len(), 3);
        let keys: Vec<&[u8]> = batch.as_engine_batch().iter().map(Mutation::key).collect();
        assert_eq!(keys, vec![&b"a"[..], &[0u8, 1][..], &b"a"[..]]);
    }

    #[test]
    fn appends_after_share_do_not_reach_shared_copy() {
        let mut batch = WriteBatch::new();
        batch.put("a", "1");
        let submitted = batch.share();
        assert_eq!(batch.in_flight(), 1);

        batch.put("b", "2");
        assert_eq!(submitted.len(), 1);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.in_flight(), 0);
    }

    #[test]
    fn clear_leaves_shared_copy_intact() {
        let mut batch = WriteBatch::new();
        batch.put("a", "1");
        let submitted = batch.share();
        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(submitted.len(), 1);
    }

    #[test]
    fn unshared_batch_is_mutated_in_place() {
        let mut batch = WriteBatch::new();
        batch.put("a", "1");
        let before = batch.as_engine_batch() as *const EngineBatch;
        batch.put("b", "2");
        assert_eq!(before, batch.as_engine_batch() as *const EngineBatch);
    }
}
