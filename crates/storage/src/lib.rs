//! Storage layer for quarry
//!
//! This crate defines the engine contract the async layer is written against
//! and one concrete engine:
//! - Engine, Cursor, EngineFactory: the contract (open, get, atomic batched
//!   write, ordered cursors, destroy, repair)
//! - WriteBatch: ordered put/delete mutations applied atomically
//! - LogEngine: ordered in-memory table recovered from a checksummed,
//!   optionally zstd-compressed record log
//!
//! # Directory Layout
//!
//! ```text
//! <db>/
//! ├── LOCK            exclusive lock while open
//! ├── data.log        record log
//! └── data.log.tmp    compaction scratch (transient)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod cursor;
pub mod directory;
pub mod format;
pub mod log_engine;
pub mod traits;

pub use batch::{Mutation, WriteBatch};
pub use cursor::MemCursor;
pub use directory::{destroy, repair, DirLock, RepairReport};
pub use log_engine::{LogEngine, LogEngineFactory};
pub use traits::{Cursor, Engine, EngineFactory};
