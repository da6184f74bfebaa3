//! Blocking session over the asynchronous database handle.
//!
//! Every call submits one operation and then drives the runtime until the
//! callback has run, so the command-line driver exercises the same
//! open → run → op → run → close → run path as any other caller.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use quarry_core::{Error, Options, ReadOptions, Result, Value, WriteOptions};
use quarry_engine::{Database, Runtime, WriteBatch};
use tracing::debug;

type Callback<T> = Box<dyn FnOnce(Result<T>)>;

/// An open database plus the runtime that delivers its completions.
pub struct SessionState {
    runtime: Runtime,
    db: Database,
    write_options: WriteOptions,
}

impl SessionState {
    /// Open the database at `path`.
    pub fn open(runtime: Runtime, path: &Path, options: Options, sync: bool) -> Result<Self> {
        let db = runtime.database();
        let session = SessionState {
            runtime,
            db,
            write_options: WriteOptions {
                sync,
                ..WriteOptions::default()
            },
        };
        session.complete(|cb| session.db.open(path, options, cb))?;
        debug!(target: "quarry::cli", path = %path.display(), "Database opened");
        Ok(session)
    }

    /// Submit one operation and block until its callback has run.
    fn complete<T: 'static>(&self, submit: impl FnOnce(Callback<T>) -> Result<()>) -> Result<T> {
        let outcome: Rc<RefCell<Option<Result<T>>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&outcome);
        submit(Box::new(move |result| *slot.borrow_mut() = Some(result)))?;
        self.runtime.run();
        let result = outcome.borrow_mut().take();
        result.unwrap_or_else(|| Err(Error::internal("operation finished without a callback")))
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.complete(|cb| self.db.get(key, ReadOptions::bytes(), cb))
    }

    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.complete(|cb| self.db.put(key, value, self.write_options.clone(), cb))
    }

    pub fn del(&self, key: &str) -> Result<()> {
        self.complete(|cb| self.db.del(key, self.write_options.clone(), cb))
    }

    pub fn write(&self, batch: &WriteBatch) -> Result<()> {
        self.complete(|cb| self.db.write(batch, self.write_options.clone(), cb))
    }

    /// Collect up to `limit` entries starting at `start`, forwards or backwards.
    ///
    /// Reversed, the walk starts at the last key at or before `start`.
    pub fn scan(
        &self,
        start: Option<&str>,
        limit: Option<usize>,
        reverse: bool,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut it = self.db.new_iterator(ReadOptions::bytes())?;
        match (start, reverse) {
            (None, false) => it.seek_to_first()?,
            (None, true) => it.seek_to_last()?,
            (Some(key), false) => it.seek(key)?,
            (Some(key), true) => {
                it.seek(key)?;
                if !it.valid() {
                    it.seek_to_last()?;
                } else if it.key()?.map_or(false, |k| k.as_bytes() > key.as_bytes()) {
                    it.prev()?;
                }
            }
        }

        let limit = limit.unwrap_or(usize::MAX);
        let mut entries = Vec::new();
        while it.valid() && entries.len() < limit {
            if let (Some(k), Some(v)) = (it.key()?, it.value()?) {
                entries.push((k.into_vec(), v.into_vec()));
            }
            if reverse {
                it.prev()?;
            } else {
                it.next()?;
            }
        }
        it.status()?;
        Ok(entries)
    }

    /// Close the database and deliver the close completion.
    pub fn close(self) -> Result<()> {
        self.complete(|cb| self.db.close(cb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_engine::RuntimeConfig;
    use tempfile::TempDir;

    fn session(dir: &Path) -> SessionState {
        let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
        SessionState::open(runtime, dir, Options::create(), false).unwrap()
    }

    #[test]
    fn test_put_get_del() {
        let temp_dir = TempDir::new().unwrap();
        let s = session(temp_dir.path());
        s.put("Hello", "World").unwrap();
        assert_eq!(s.get("Hello").unwrap().unwrap().as_bytes(), b"World");
        s.del("Hello").unwrap();
        assert_eq!(s.get("Hello").unwrap(), None);
        s.close().unwrap();
    }

    #[test]
    fn test_scan_directions() {
        let temp_dir = TempDir::new().unwrap();
        let s = session(temp_dir.path());
        let mut batch = WriteBatch::new();
        for key in ["a", "b", "c", "d"] {
            batch.put(key, key.to_uppercase());
        }
        s.write(&batch).unwrap();

        let keys = |entries: Vec<(Vec<u8>, Vec<u8>)>| {
            entries
                .into_iter()
                .map(|(k, _)| String::from_utf8(k).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(keys(s.scan(None, None, false).unwrap()), ["a", "b", "c", "d"]);
        assert_eq!(keys(s.scan(Some("b"), Some(2), false).unwrap()), ["b", "c"]);
        assert_eq!(keys(s.scan(None, Some(3), true).unwrap()), ["d", "c", "b"]);
        assert_eq!(keys(s.scan(Some("bb"), None, true).unwrap()), ["b", "a"]);
        assert_eq!(keys(s.scan(Some("c"), None, true).unwrap()), ["c", "b", "a"]);
        assert_eq!(keys(s.scan(Some("z"), Some(1), true).unwrap()), ["d"]);
        s.close().unwrap();
    }

    #[test]
    fn test_open_missing_without_create_fails() {
        let temp_dir = TempDir::new().unwrap();
        let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
        let err = SessionState::open(runtime, &temp_dir.path().join("nope"), Options::default(), false)
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
