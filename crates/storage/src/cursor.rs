//! Ordered cursor over the in-memory table of a [`LogEngine`].
//!
//! The cursor holds its current entry by value and re-seeks relative to it on
//! every move, so it stays well-defined while writers modify the table.
//!
//! [`LogEngine`]: crate::LogEngine

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use quarry_core::Result;

use crate::traits::Cursor;

pub(crate) type Table = BTreeMap<Bytes, Bytes>;

/// Cursor over a shared ordered table
pub struct MemCursor {
    table: Arc<RwLock<Table>>,
    current: Option<(Bytes, Bytes)>,
}

impl MemCursor {
    pub(crate) fn new(table: Arc<RwLock<Table>>) -> Self {
        MemCursor {
            table,
            current: None,
        }
    }

    fn first_in(&self, range: (Bound<&[u8]>, Bound<&[u8]>)) -> Option<(Bytes, Bytes)> {
        let table = self.table.read();
        table
            .range::<[u8], _>(range)
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn last_in(&self, range: (Bound<&[u8]>, Bound<&[u8]>)) -> Option<(Bytes, Bytes)> {
        let table = self.table.read();
        table
            .range::<[u8], _>(range)
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone()))
    }
}

impl Cursor for MemCursor {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek_to_first(&mut self) {
        self.current = self.first_in((Bound::Unbounded, Bound::Unbounded));
    }

    fn seek_to_last(&mut self) {
        self.current = self.last_in((Bound::Unbounded, Bound::Unbounded));
    }

    fn seek(&mut self, target: &[u8]) {
        self.current = self.first_in((Bound::Included(target), Bound::Unbounded));
    }

    fn next(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.current = self.first_in((Bound::Excluded(&key[..]), Bound::Unbounded));
        }
    }

    fn prev(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.current = self.last_in((Bound::Unbounded, Bound::Excluded(&key[..])));
        }
    }

    fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| &k[..])
    }

    fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, v)| &v[..])
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(keys: &[&str]) -> Arc<RwLock<Table>> {
        let mut map = Table::new();
        for key in keys {
            map.insert(
                Bytes::copy_from_slice(key.as_bytes()),
                Bytes::copy_from_slice(key.to_uppercase().as_bytes()),
            );
        }
        Arc::new(RwLock::new(map))
    }

    fn collect_forward(cursor: &mut MemCursor) -> Vec<Vec<u8>> {
        let mut keys = Vec::new();
        cursor.seek_to_first();
        while cursor.valid() {
            keys.push(cursor.key().unwrap().to_vec());
            cursor.next();
        }
        keys
    }

    #[test]
    fn unpositioned_cursor_is_invalid() {
        let cursor = MemCursor::new(table(&["a"]));
        assert!(!cursor.valid());
        assert!(cursor.key().is_none());
    }

    #[test]
    fn forward_and_backward() {
        let mut cursor = MemCursor::new(table(&["b", "a", "c"]));
        assert_eq!(
            collect_forward(&mut cursor),
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );

        cursor.seek_to_last();
        assert_eq!(cursor.key(), Some(&b"c"[..]));
        assert_eq!(cursor.value(), Some(&b"C"[..]));
        cursor.prev();
        cursor.prev();
        assert_eq!(cursor.key(), Some(&b"a"[..]));
        cursor.prev();
        assert!(!cursor.valid());
    }

    #[test]
    fn seek_lands_on_next_key() {
        let mut cursor = MemCursor::new(table(&["apple", "cherry"]));
        cursor.seek(b"banana");
        assert_eq!(cursor.key(), Some(&b"cherry"[..]));
        cursor.seek(b"zebra");
        assert!(!cursor.valid());
    }

    #[test]
    fn empty_table() {
        let mut cursor = MemCursor::new(table(&[]));
        cursor.seek_to_first();
        assert!(!cursor.valid());
        cursor.seek_to_last();
        assert!(!cursor.valid());
        assert!(cursor.status().is_ok());
    }

    #[test]
    fn sees_keys_inserted_after_position() {
        let shared = table(&["a", "c"]);
        let mut cursor = MemCursor::new(Arc::clone(&shared));
        cursor.seek_to_first();
        shared
            .write()
            .insert(Bytes::from_static(b"b"), Bytes::from_static(b"B"));
        cursor.next();
        assert_eq!(cursor.key(), Some(&b"b"[..]));
    }
}
