//! Database directory management
//!
//! File names, the exclusive directory lock, compact log rewriting and the
//! directory-level destroy/repair operations.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use fs2::FileExt;
use quarry_core::{Compression, Error, Options, Result};
use tracing::{info, warn};

use crate::batch::WriteBatch;
use crate::format::{encode_record, file_header, scan_log};

/// Lock file held exclusively while a database is open
pub const LOCK_FILE: &str = "LOCK";

/// Record log
pub const LOG_FILE: &str = "data.log";

/// Scratch file for compaction and repair
pub const TMP_LOG_FILE: &str = "data.log.tmp";

/// Target size of one record when rewriting a log
const REWRITE_CHUNK_BYTES: usize = 1 << 20;

/// Path of the record log inside `dir`
pub fn log_path(dir: &Path) -> PathBuf {
    dir.join(LOG_FILE)
}

/// Exclusive advisory lock on a database directory.
///
/// Released when dropped.
#[derive(Debug)]
pub struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    /// Acquire the lock for `dir`, failing immediately if it is held.
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io_at(&path, e))?;
        FileExt::try_lock_exclusive(&file).map_err(|_| {
            Error::io_at(
                &path,
                io::Error::new(io::ErrorKind::WouldBlock, "already held by another handle"),
            )
        })?;
        Ok(DirLock { file, path })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Write a fresh log holding exactly `entries` and return its length.
///
/// The log is written to [`TMP_LOG_FILE`], synced, then renamed over
/// [`LOG_FILE`], so a crash leaves either the old or the new log in place.
pub fn rewrite_log<'a, I>(dir: &Path, entries: I, compression: Compression) -> Result<u64>
where
    I: IntoIterator<Item = (&'a Bytes, &'a Bytes)>,
{
    let tmp = dir.join(TMP_LOG_FILE);
    let mut file = File::create(&tmp).map_err(|e| Error::io_at(&tmp, e))?;

    let header = file_header();
    file.write_all(&header).map_err(|e| Error::io_at(&tmp, e))?;
    let mut len = header.len() as u64;

    let mut chunk = WriteBatch::new();
    for (key, value) in entries {
        chunk.put(key.clone().into(), value.clone().into());
        if chunk.encoded_len() >= REWRITE_CHUNK_BYTES {
            len += flush_chunk(&mut file, &tmp, &mut chunk, compression)?;
        }
    }
    if !chunk.is_empty() {
        len += flush_chunk(&mut file, &tmp, &mut chunk, compression)?;
    }

    file.sync_all().map_err(|e| Error::io_at(&tmp, e))?;
    drop(file);

    let target = log_path(dir);
    fs::rename(&tmp, &target).map_err(|e| Error::io_at(&target, e))?;
    Ok(len)
}

fn flush_chunk(
    file: &mut File,
    path: &Path,
    chunk: &mut WriteBatch,
    compression: Compression,
) -> Result<u64> {
    let record = encode_record(chunk, compression)?;
    file.write_all(&record).map_err(|e| Error::io_at(path, e))?;
    chunk.clear();
    Ok(record.len() as u64)
}

/// Delete the database at `dir`.
///
/// A missing directory is success. Fails if the database is open elsewhere.
pub fn destroy(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let lock = DirLock::acquire(dir)?;

    for name in [LOG_FILE, TMP_LOG_FILE] {
        let path = dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io_at(&path, e)),
        }
    }

    let lock_path = lock.path().to_path_buf();
    drop(lock);
    match fs::remove_file(&lock_path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io_at(&lock_path, e)),
    }

    // Leave directories holding foreign files alone.
    match fs::remove_dir(dir) {
        Ok(()) => {
            info!(target: "quarry::storage", path = %dir.display(), "Destroyed database");
        }
        Err(e) => {
            warn!(target: "quarry::storage", path = %dir.display(), error = %e, "Database files removed but directory kept");
        }
    }
    Ok(())
}

/// Outcome of a repair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Batches salvaged from the log
    pub batches_recovered: usize,
    /// Records dropped for bad checksums or undecodable payloads
    pub records_dropped: usize,
    /// Bytes of incomplete trailing record discarded
    pub tail_bytes_discarded: u64,
    /// Live keys in the rewritten log
    pub keys: usize,
}

/// Salvage every intact record of the database at `dir` and rewrite the log
/// compactly.
pub fn repair(dir: &Path, options: &Options) -> Result<RepairReport> {
    let path = log_path(dir);
    if !path.exists() {
        return Err(Error::invalid_argument(format!(
            "{}: does not exist",
            dir.display()
        )));
    }
    let _lock = DirLock::acquire(dir)?;

    let data = fs::read(&path).map_err(|e| Error::io_at(&path, e))?;
    let scan = scan_log(&data)?;

    let mut table = std::collections::BTreeMap::new();
    for batch in &scan.batches {
        crate::log_engine::apply_batch(&mut table, batch);
    }
    rewrite_log(dir, table.iter(), options.compression)?;

    let report = RepairReport {
        batches_recovered: scan.batches.len(),
        records_dropped: scan.dropped,
        tail_bytes_discarded: scan.torn_tail,
        keys: table.len(),
    };
    if scan.is_clean() {
        info!(target: "quarry::storage", path = %dir.display(), keys = report.keys, "Repair found no damage");
    } else {
        warn!(
            target: "quarry::storage",
            path = %dir.display(),
            batches_recovered = report.batches_recovered,
            records_dropped = report.records_dropped,
            tail_bytes_discarded = report.tail_bytes_discarded,
            "Repaired damaged log"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let first = DirLock::acquire(dir.path()).unwrap();
        let err = DirLock::acquire(dir.path()).unwrap_err();
        assert!(err.to_string().starts_with("IO error:"));
        drop(first);
        DirLock::acquire(dir.path()).unwrap();
    }

    #[test]
    fn destroy_missing_directory_is_ok() {
        let dir = TempDir::new().unwrap();
        destroy(&dir.path().join("nope")).unwrap();
    }

    #[test]
    fn destroy_refuses_locked_directory() {
        let dir = TempDir::new().unwrap();
        let _lock = DirLock::acquire(dir.path()).unwrap();
        assert!(destroy(dir.path()).is_err());
    }

    #[test]
    fn repair_missing_log_is_invalid_argument() {
        let dir = TempDir::new().unwrap();
        let err = repair(dir.path(), &Options::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn rewrite_log_is_scannable() {
        let dir = TempDir::new().unwrap();
        let entries = vec![
            (Bytes::from_static(b"a"), Bytes::from_static(b"1")),
            (Bytes::from_static(b"b"), Bytes::from_static(b"2")),
        ];
        let len = rewrite_log(
            dir.path(),
            entries.iter().map(|(k, v)| (k, v)),
            Compression::Zstd,
        )
        .unwrap();

        let data = fs::read(log_path(dir.path())).unwrap();
        assert_eq!(data.len() as u64, len);
        let scan = scan_log(&data).unwrap();
        assert!(scan.is_clean());
        assert_eq!(scan.batches.len(), 1);
        assert_eq!(scan.batches[0].len(), 2);
        assert!(!dir.path().join(TMP_LOG_FILE).exists());
    }
}
