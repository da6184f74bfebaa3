//! Core types for quarry
//!
//! This crate defines the foundational types shared by every layer:
//! - Error: error taxonomy (argument / illegal-state / engine)
//! - Status: outcome slot filled by a worker-thread engine call
//! - Options, ReadOptions, WriteOptions: engine option structs
//! - Slice, Value: key/value encodings going in and coming back out

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod options;
pub mod slice;
pub mod status;

pub use error::{Error, ErrorKind, Result};
pub use options::{Compression, Options, ReadOptions, WriteOptions};
pub use slice::{Slice, Value};
pub use status::Status;
