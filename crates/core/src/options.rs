//! Engine option structs and their translation from configuration dictionaries
//!
//! Options arrive as loosely-typed configuration (a TOML table, a JSON object)
//! and are translated here into the structs the engine consumes. Unrecognized
//! keys are rejected rather than silently ignored. The read `snapshot` key and
//! the write `separate_thread` hint are recognized but have no effect; only
//! their presence is recorded.
//!
//! # Example
//!
//! ```toml
//! create_if_missing = true
//! write_buffer_size = 4194304
//! compression = "zstd"
//! ```

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Compression applied to log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Store records verbatim
    None,
    /// Compress large records with zstd
    #[default]
    Zstd,
}

/// Options for opening, destroying and repairing a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Create the database if it does not exist
    pub create_if_missing: bool,
    /// Fail the open if the database already exists
    pub error_if_exists: bool,
    /// Treat any detected corruption as fatal instead of skipping it
    pub paranoid_checks: bool,
    /// Block cache capacity in bytes
    pub cache_size: usize,
    /// Bytes of log accumulated before the log is rewritten compactly
    pub write_buffer_size: usize,
    /// Upper bound on files the engine may hold open
    pub max_open_files: usize,
    /// Approximate size of user data packed per block
    pub block_size: usize,
    /// Number of keys between restart points for delta encoding of keys
    pub block_restart_interval: usize,
    /// Record compression
    pub compression: Compression,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: false,
            error_if_exists: false,
            paranoid_checks: false,
            cache_size: 8 << 20,
            write_buffer_size: 4 << 20,
            max_open_files: 1000,
            block_size: 4096,
            block_restart_interval: 16,
            compression: Compression::default(),
        }
    }
}

impl Options {
    /// Options with `create_if_missing` set, the common case for new databases.
    pub fn create() -> Self {
        Self {
            create_if_missing: true,
            ..Self::default()
        }
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("write_buffer_size", self.write_buffer_size),
            ("max_open_files", self.max_open_files),
            ("block_size", self.block_size),
            ("block_restart_interval", self.block_restart_interval),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(Error::bad_argument(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    /// Translate a TOML table into options.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let options: Options = toml::from_str(s)
            .map_err(|e| Error::bad_argument(format!("invalid options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Translate a JSON object into options.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let options: Options = serde_json::from_value(value)
            .map_err(|e| Error::bad_argument(format!("invalid options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }
}

/// Options for point reads and iterators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadOptions {
    /// Verify checksums of data read from storage
    pub verify_checksums: bool,
    /// Populate the block cache with data read by this call
    pub fill_cache: bool,
    /// Deliver keys and values as raw bytes instead of text
    pub as_buffer: bool,
    /// Set when the caller supplied a `snapshot` reference. Snapshots are
    /// not supported: reads always see the latest committed state.
    #[serde(deserialize_with = "present", skip_serializing)]
    pub snapshot: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_checksums: false,
            fill_cache: true,
            as_buffer: false,
            snapshot: false,
        }
    }
}

impl ReadOptions {
    /// Read options that deliver raw bytes.
    pub fn bytes() -> Self {
        Self {
            as_buffer: true,
            ..Self::default()
        }
    }

    /// Translate a JSON object into read options.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::bad_argument(format!("invalid read options: {}", e)))
    }
}

/// Options for writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriteOptions {
    /// Flush the write to stable storage before reporting completion
    pub sync: bool,
    /// Set when the caller supplied the `separate_thread` hint. Every write
    /// already runs on a worker thread, so the hint changes nothing.
    #[serde(deserialize_with = "present", skip_serializing)]
    pub separate_thread: bool,
}

impl WriteOptions {
    /// Write options with `sync` set.
    pub fn synced() -> Self {
        Self {
            sync: true,
            ..Self::default()
        }
    }

    /// Translate a JSON object into write options.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::bad_argument(format!("invalid write options: {}", e)))
    }
}

/// Accept any value for a recognized-but-unsupported key.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    IgnoredAny::deserialize(deserializer)?;
    Ok(true)
}
