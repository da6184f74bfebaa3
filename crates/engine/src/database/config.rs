//! Runtime configuration via `quarry.toml`
//!
//! Sizes the worker pool and supplies the default open options. A missing
//! file means defaults; `write_default_if_missing` drops a commented template
//! next to the data for editing.

use serde::{Deserialize, Serialize};
use std::path::Path;

use quarry_core::{Error, Options, Result};

/// Config file name looked up by the CLI.
pub const CONFIG_FILE_NAME: &str = "quarry.toml";

/// Runtime configuration loaded from `quarry.toml`.
///
/// # Example
///
/// ```toml
/// workers = 4
/// max_queue_depth = 4096
///
/// [options]
/// create_if_missing = true
/// compression = "zstd"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Number of worker threads executing engine calls
    pub workers: usize,
    /// Jobs allowed to wait for a worker before submissions are refused
    pub max_queue_depth: usize,
    /// Options used when a caller does not supply its own
    pub options: Options,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_queue_depth: 4096,
            options: Options::default(),
        }
    }
}

impl RuntimeConfig {
    /// Reject configurations the runtime cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::bad_argument("workers must be positive"));
        }
        if self.max_queue_depth == 0 {
            return Err(Error::bad_argument("max_queue_depth must be positive"));
        }
        self.options.validate()
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# quarry runtime configuration

# Worker threads running blocking engine calls (default: 4)
workers = 4

# Submissions beyond this many waiting jobs fail with "Busy" (default: 4096)
max_queue_depth = 4096

# Default options for opening databases.
[options]
create_if_missing = false
error_if_exists = false
paranoid_checks = false
# Log bytes accumulated before the log is rewritten compactly
write_buffer_size = 4194304
# "none" or "zstd"
compression = "zstd"
# Accepted for compatibility, advisory only:
# cache_size = 8388608
# max_open_files = 1000
# block_size = 4096
# block_restart_interval = 16
"#
    }

    /// Parse TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RuntimeConfig = toml::from_str(content)
            .map_err(|e| Error::bad_argument(format!("invalid runtime config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::BadArgument(msg) => {
                Error::BadArgument(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Read `path` if it exists, defaults otherwise.
    pub fn from_file_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| Error::io_at(path, e))?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::internal(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| Error::io_at(path, e))
    }
}
