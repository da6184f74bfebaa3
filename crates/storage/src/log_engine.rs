//! LogEngine: ordered in-memory table backed by an append-only record log
//!
//! - `BTreeMap<Bytes, Bytes>` under a `parking_lot::RwLock` serves gets and cursors
//! - every write batch is one checksummed log record, appended before the
//!   table is touched, so a batch is either fully replayed or not at all
//! - the log is rewritten compactly once it outgrows `write_buffer_size`
//!
//! Writers are serialized by the log writer mutex; readers only take the
//! table's read lock.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use quarry_core::{Error, Options, ReadOptions, Result, WriteOptions};
use tracing::{debug, error, info, warn};

use crate::batch::{Mutation, WriteBatch};
use crate::cursor::{MemCursor, Table};
use crate::directory::{self, log_path, rewrite_log, DirLock};
use crate::format::{encode_record, file_header, scan_log};
use crate::traits::{Cursor, Engine, EngineFactory};

/// Apply `batch` to `table` in mutation order.
pub(crate) fn apply_batch(table: &mut Table, batch: &WriteBatch) {
    for mutation in batch.iter() {
        match mutation {
            Mutation::Put { key, value } => {
                table.insert(key.clone(), value.clone());
            }
            Mutation::Delete { key } => {
                table.remove(&key[..]);
            }
        }
    }
}

struct LogWriter {
    file: File,
    /// Current log length in bytes
    len: u64,
    /// Log length right after the last compaction (or open)
    base_len: u64,
    /// Why appends are refused, once the log tail can no longer be trusted
    poisoned: Option<String>,
}

impl LogWriter {
    fn check_writable(&self, path: &Path) -> Result<()> {
        match &self.poisoned {
            Some(reason) => Err(Error::corruption(format!(
                "{}: {}; reopen or repair the database before writing",
                path.display(),
                reason
            ))),
            None => Ok(()),
        }
    }

    /// Drop the partial record a failed append may have left behind.
    fn roll_back(&mut self, path: &Path) {
        if let Err(e) = self.file.set_len(self.len) {
            error!(
                target: "quarry::storage",
                path = %path.display(),
                len = self.len,
                error = %e,
                "Could not truncate partial record; refusing further writes"
            );
            self.poisoned = Some(format!("partial record left after failed append ({})", e));
        }
    }
}

/// An open database directory
pub struct LogEngine {
    dir: PathBuf,
    table: Arc<RwLock<Table>>,
    writer: Mutex<LogWriter>,
    options: Options,
    _lock: DirLock,
}

impl std::fmt::Debug for LogEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEngine")
            .field("dir", &self.dir)
            .field("keys", &self.table.read().len())
            .finish()
    }
}

impl LogEngine {
    /// Open the database at `dir` according to `options`.
    pub fn open(dir: &Path, options: &Options) -> Result<Self> {
        options.validate()?;

        if !dir.exists() {
            if !options.create_if_missing {
                return Err(Error::invalid_argument(format!(
                    "{}: does not exist (create_if_missing is false)",
                    dir.display()
                )));
            }
            fs::create_dir_all(dir).map_err(|e| Error::io_at(dir, e))?;
        }

        let lock = DirLock::acquire(dir)?;
        let path = log_path(dir);

        if path.exists() {
            if options.error_if_exists {
                return Err(Error::invalid_argument(format!(
                    "{}: exists (error_if_exists is true)",
                    dir.display()
                )));
            }
        } else {
            if !options.create_if_missing {
                return Err(Error::invalid_argument(format!(
                    "{}: does not exist (create_if_missing is false)",
                    dir.display()
                )));
            }
            let mut file = File::create(&path).map_err(|e| Error::io_at(&path, e))?;
            file.write_all(&file_header())
                .map_err(|e| Error::io_at(&path, e))?;
            file.sync_all().map_err(|e| Error::io_at(&path, e))?;
            info!(target: "quarry::storage", path = %dir.display(), "Created database");
        }

        let table = Self::replay(dir, &path, options)?;
        let len = fs::metadata(&path)
            .map_err(|e| Error::io_at(&path, e))?
            .len();
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| Error::io_at(&path, e))?;

        debug!(
            target: "quarry::storage",
            cache_size = options.cache_size,
            max_open_files = options.max_open_files,
            block_size = options.block_size,
            block_restart_interval = options.block_restart_interval,
            "Advisory options accepted"
        );
        info!(
            target: "quarry::storage",
            path = %dir.display(),
            keys = table.len(),
            log_bytes = len,
            "Opened database"
        );

        Ok(LogEngine {
            dir: dir.to_path_buf(),
            table: Arc::new(RwLock::new(table)),
            writer: Mutex::new(LogWriter {
                file,
                len,
                base_len: len,
                poisoned: None,
            }),
            options: options.clone(),
            _lock: lock,
        })
    }

    fn replay(dir: &Path, path: &Path, options: &Options) -> Result<Table> {
        let data = fs::read(path).map_err(|e| Error::io_at(path, e))?;
        let scan = scan_log(&data)?;

        if !scan.is_clean() {
            let detail = scan
                .first_error
                .clone()
                .unwrap_or_else(|| "damaged log".to_string());
            if options.paranoid_checks {
                return Err(Error::corruption(format!("{}: {}", path.display(), detail)));
            }
            warn!(
                target: "quarry::storage",
                path = %dir.display(),
                records_dropped = scan.dropped,
                tail_bytes = scan.torn_tail,
                detail = %detail,
                "Skipping damaged log records"
            );
            if scan.torn_tail > 0 {
                let file = OpenOptions::new()
                    .write(true)
                    .open(path)
                    .map_err(|e| Error::io_at(path, e))?;
                file.set_len(scan.valid_len)
                    .map_err(|e| Error::io_at(path, e))?;
                file.sync_all().map_err(|e| Error::io_at(path, e))?;
            }
        }

        let mut table = Table::new();
        for batch in &scan.batches {
            apply_batch(&mut table, batch);
        }
        Ok(table)
    }

    /// Directory this engine was opened on
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of live keys
    pub fn key_count(&self) -> usize {
        self.table.read().len()
    }

    /// Current size of the record log in bytes
    pub fn log_size(&self) -> u64 {
        self.writer.lock().len
    }

    /// Rewrite the log so it holds only live entries.
    pub fn compact(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        self.compact_locked(&mut writer)
    }

    fn compact_locked(&self, writer: &mut LogWriter) -> Result<()> {
        let before = writer.len;
        let after = {
            let table = self.table.read();
            rewrite_log(&self.dir, table.iter(), self.options.compression)?
        };

        let path = log_path(&self.dir);
        writer.file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| Error::io_at(&path, e))?;
        writer.len = after;
        writer.base_len = after;

        info!(
            target: "quarry::storage",
            path = %self.dir.display(),
            before_bytes = before,
            after_bytes = after,
            "Compacted log"
        );
        Ok(())
    }

    fn should_compact(&self, writer: &LogWriter) -> bool {
        writer.len > self.options.write_buffer_size as u64 && writer.len > 2 * writer.base_len
    }
}

impl Engine for LogEngine {
    fn get(&self, _options: &ReadOptions, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.table.read().get(key).map(|v| v.to_vec()))
    }

    fn write(&self, options: &WriteOptions, batch: &WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let record = encode_record(batch, self.options.compression)?;
        let path = log_path(&self.dir);

        let mut writer = self.writer.lock();
        writer.check_writable(&path)?;
        if let Err(e) = writer.file.write_all(&record) {
            writer.roll_back(&path);
            return Err(Error::io_at(&path, e));
        }
        writer.len += record.len() as u64;
        if options.sync {
            if let Err(e) = writer.file.sync_data() {
                // The record may or may not be on disk; the table no longer
                // matches what a replay would produce.
                error!(target: "quarry::storage", path = %path.display(), error = %e, "Log sync failed");
                writer.poisoned = Some(format!("log sync failed ({})", e));
                return Err(Error::io_at(&path, e));
            }
        }

        apply_batch(&mut self.table.write(), batch);

        if self.should_compact(&writer) {
            if let Err(e) = self.compact_locked(&mut writer) {
                // The record is durable; compaction is retried on a later write.
                warn!(target: "quarry::storage", error = %e, "Log compaction failed");
            }
        }
        Ok(())
    }

    fn cursor(&self, _options: &ReadOptions) -> Box<dyn Cursor> {
        Box::new(MemCursor::new(Arc::clone(&self.table)))
    }
}

impl Drop for LogEngine {
    fn drop(&mut self) {
        let writer = self.writer.get_mut();
        if let Err(e) = writer.file.sync_all() {
            warn!(target: "quarry::storage", path = %self.dir.display(), error = %e, "Final log sync failed");
        }
        debug!(target: "quarry::storage", path = %self.dir.display(), "Closed database");
    }
}

/// [`EngineFactory`] for [`LogEngine`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEngineFactory;

impl EngineFactory for LogEngineFactory {
    fn open(&self, path: &Path, options: &Options) -> Result<Arc<dyn Engine>> {
        Ok(Arc::new(LogEngine::open(path, options)?))
    }

    fn destroy(&self, path: &Path, _options: &Options) -> Result<()> {
        directory::destroy(path)
    }

    fn repair(&self, path: &Path, options: &Options) -> Result<()> {
        directory::repair(path, options).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::Slice;
    use tempfile::TempDir;

    fn put(engine: &LogEngine, key: &str, value: &str) {
        let mut batch = WriteBatch::new();
        batch.put(Slice::from(key), Slice::from(value));
        engine.write(&WriteOptions::default(), &batch).unwrap();
    }

    #[test]
    fn open_missing_without_create_fails() {
        let dir = TempDir::new().unwrap();
        let err = LogEngine::open(&dir.path().join("db"), &Options::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(err.to_string().contains("create_if_missing"));
    }

    #[test]
    fn error_if_exists_rejects_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        drop(LogEngine::open(&path, &Options::create()).unwrap());

        let options = Options {
            error_if_exists: true,
            ..Options::create()
        };
        let err = LogEngine::open(&path, &options).unwrap_err();
        assert!(err.to_string().contains("error_if_exists"));
    }

    #[test]
    fn second_open_of_locked_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        let _first = LogEngine::open(&path, &Options::create()).unwrap();
        assert!(matches!(
            LogEngine::open(&path, &Options::create()),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn apply_batch_respects_order() {
        let mut table = Table::new();
        let mut batch = WriteBatch::new();
        batch.put(Slice::from("k"), Slice::from("1"));
        batch.delete(Slice::from("k"));
        batch.put(Slice::from("k"), Slice::from("2"));
        apply_batch(&mut table, &batch);
        assert_eq!(table.get(&b"k"[..]).map(|v| &v[..]), Some(&b"2"[..]));
    }

    #[test]
    fn failed_append_that_cannot_be_rolled_back_refuses_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        let engine = LogEngine::open(&path, &Options::create()).unwrap();
        put(&engine, "before", "1");

        // A read-only handle fails both the append and the truncation.
        let writable = {
            let mut writer = engine.writer.lock();
            let read_only = File::open(log_path(&path)).unwrap();
            std::mem::replace(&mut writer.file, read_only)
        };
        let mut batch = WriteBatch::new();
        batch.put(Slice::from("lost"), Slice::from("x"));
        let err = engine.write(&WriteOptions::default(), &batch).unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        // Even with a working file back, the writer stays closed.
        engine.writer.lock().file = writable;
        let err = engine.write(&WriteOptions::default(), &batch).unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("partial record"));
        let read = ReadOptions::default();
        assert_eq!(engine.get(&read, b"lost").unwrap(), None);
        assert_eq!(engine.get(&read, b"before").unwrap().unwrap(), b"1");

        drop(engine);
        let engine = LogEngine::open(&path, &Options::create()).unwrap();
        put(&engine, "after", "2");
        assert_eq!(engine.get(&read, b"before").unwrap().unwrap(), b"1");
        assert_eq!(engine.get(&read, b"after").unwrap().unwrap(), b"2");
    }

    #[test]
    fn rolled_back_append_keeps_writer_usable() {
        let dir = TempDir::new().unwrap();
        let engine = LogEngine::open(&dir.path().join("db"), &Options::create()).unwrap();
        let len = engine.log_size();
        {
            let mut writer = engine.writer.lock();
            writer.roll_back(&log_path(engine.dir()));
            assert!(writer.poisoned.is_none());
            assert_eq!(writer.len, len);
        }
        put(&engine, "k", "v");
        assert!(engine.log_size() > len);
    }

    #[test]
    fn compaction_keeps_live_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        let options = Options {
            write_buffer_size: 1024,
            ..Options::create()
        };
        {
            let engine = LogEngine::open(&path, &options).unwrap();
            for i in 0..200 {
                put(&engine, "hot", &format!("value-{}", i));
            }
            put(&engine, "cold", "kept");
            assert!(engine.log_size() < 1024 * 2);
            assert_eq!(engine.key_count(), 2);
        }

        let engine = LogEngine::open(&path, &options).unwrap();
        let read = ReadOptions::default();
        assert_eq!(engine.get(&read, b"hot").unwrap().unwrap(), b"value-199");
        assert_eq!(engine.get(&read, b"cold").unwrap().unwrap(), b"kept");
    }
}
