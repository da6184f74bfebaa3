//! Iterator handle behaviour over the log engine

use quarry_core::{Error, Options, ReadOptions, Value, WriteOptions};
use quarry_engine::{discard, Database, Runtime, RuntimeConfig, WriteBatch};
use tempfile::TempDir;

fn populated(keys: &[&str]) -> (TempDir, Runtime, Database) {
    let temp_dir = TempDir::new().unwrap();
    let rt = Runtime::new(RuntimeConfig::default()).unwrap();
    let db = rt.database();
    db.open(temp_dir.path(), Options::create(), |r| r.unwrap())
        .unwrap();
    rt.run();

    let mut batch = WriteBatch::new();
    for key in keys {
        batch.put(*key, format!("v-{}", key));
    }
    db.write(&batch, WriteOptions::default(), |r| r.unwrap())
        .unwrap();
    rt.run();
    (temp_dir, rt, db)
}

#[test]
fn seek_lands_on_first_key_at_or_after_target() {
    let (_dir, _rt, db) = populated(&["apple", "banana", "cherry"]);
    let mut it = db.new_iterator(ReadOptions::default()).unwrap();

    it.seek("b").unwrap();
    assert_eq!(it.key().unwrap().unwrap(), "banana");
    assert_eq!(it.value().unwrap().unwrap(), "v-banana");

    it.seek("banana").unwrap();
    assert_eq!(it.key().unwrap().unwrap(), "banana");

    it.seek("zzz").unwrap();
    assert!(!it.valid());
    assert_eq!(it.key().unwrap(), None);
    it.status().unwrap();
}

#[test]
fn next_and_prev_at_the_edges() {
    let (_dir, _rt, db) = populated(&["a", "b"]);
    let mut it = db.new_iterator(ReadOptions::default()).unwrap();

    it.seek_to_last().unwrap();
    it.next().unwrap();
    assert!(!it.valid());
    // Moving an exhausted iterator is a no-op.
    it.next().unwrap();
    it.prev().unwrap();
    assert!(!it.valid());

    it.seek_to_first().unwrap();
    it.prev().unwrap();
    assert!(!it.valid());
}

#[test]
fn as_buffer_yields_bytes() {
    let (_dir, _rt, db) = populated(&["k"]);
    let mut it = db.new_iterator(ReadOptions::bytes()).unwrap();
    it.seek_to_first().unwrap();
    assert_eq!(
        it.key().unwrap(),
        Some(Value::Bytes(bytes::Bytes::from_static(b"k")))
    );
    assert!(it.value().unwrap().unwrap().is_bytes());
}

#[test]
fn dropping_an_iterator_deregisters_it() {
    let (_dir, _rt, db) = populated(&["a"]);
    let first = db.new_iterator(ReadOptions::default()).unwrap();
    let mut second = db.new_iterator(ReadOptions::default()).unwrap();
    assert_eq!(db.live_iterators(), 2);

    drop(first);
    assert_eq!(db.live_iterators(), 1);

    second.close();
    second.close();
    assert!(second.is_closed());
    assert_eq!(db.live_iterators(), 0);
    assert!(matches!(second.seek_to_first(), Err(Error::IllegalState(_))));
    assert!(matches!(second.status(), Err(Error::IllegalState(_))));
}

#[test]
fn iterator_sees_writes_made_after_creation() {
    let (_dir, rt, db) = populated(&["a", "c"]);
    let mut it = db.new_iterator(ReadOptions::default()).unwrap();
    it.seek_to_first().unwrap();
    assert_eq!(it.key().unwrap().unwrap(), "a");

    db.put("b", "late", WriteOptions::default(), discard).unwrap();
    rt.run();

    it.next().unwrap();
    assert_eq!(it.key().unwrap().unwrap(), "b");
    assert_eq!(it.value().unwrap().unwrap(), "late");
}

#[test]
fn iterator_outlives_dropped_handle_clone() {
    let (_dir, rt, db) = populated(&["a"]);
    let clone = db.clone();
    let mut it = clone.new_iterator(ReadOptions::default()).unwrap();
    drop(clone);

    it.seek_to_first().unwrap();
    assert!(it.valid());

    db.close(discard).unwrap();
    rt.run();
    assert!(it.is_closed());
}
