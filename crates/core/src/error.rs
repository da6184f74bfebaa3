//! Error types for quarry
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Errors fall into three families (see [`ErrorKind`]):
//! - argument errors, raised at the call site before any thread handoff
//! - illegal-state errors, also raised at the call site
//! - engine errors, which only ever travel through a completion callback

use std::io;
use std::path::Path;
use thiserror::Error;

/// Result type alias for quarry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong arity or wrong value kind for a parameter
    Argument,
    /// Operation attempted without the state it requires
    IllegalState,
    /// Failure status reported by the storage engine
    Engine,
}

/// Error types for quarry
#[derive(Debug, Error)]
pub enum Error {
    /// A parameter was missing, malformed, or of the wrong kind
    #[error("Bad argument: {0}")]
    BadArgument(String),

    /// Operation requires state the handle does not have (e.g. no open instance)
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// The worker pool refused the submission (queue full or shut down)
    #[error("Busy: {0}")]
    Busy(String),

    /// I/O error reported by the engine
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption detected by the engine
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Engine-level argument violation (existence policies and the like)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invariant violated inside quarry itself
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a bad-argument error
    pub fn bad_argument(msg: impl Into<String>) -> Self {
        Error::BadArgument(msg.into())
    }

    /// Create an illegal-state error
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Error::IllegalState(msg.into())
    }

    /// Create a corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Create an engine-level invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Wrap an I/O error with the path it concerns.
    pub fn io_at(path: &Path, err: io::Error) -> Self {
        Error::Io(io::Error::new(
            err.kind(),
            format!("{}: {}", path.display(), err),
        ))
    }

    /// Classify this error into the argument / illegal-state / engine taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadArgument(_) => ErrorKind::Argument,
            Error::IllegalState(_) | Error::Busy(_) => ErrorKind::IllegalState,
            Error::Io(_)
            | Error::Corruption(_)
            | Error::InvalidArgument(_)
            | Error::Internal(_) => ErrorKind::Engine,
        }
    }

    /// Returns true for corruption errors
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_bad_argument() {
        let err = Error::bad_argument("Argument 1 must be a string");
        assert_eq!(err.to_string(), "Bad argument: Argument 1 must be a string");
    }

    #[test]
    fn test_error_display_illegal_state() {
        let err = Error::illegal_state("DB.open() has not been called");
        assert_eq!(
            err.to_string(),
            "Illegal state: DB.open() has not been called"
        );
    }

    #[test]
    fn test_error_display_engine_statuses() {
        assert!(Error::corruption("bad crc")
            .to_string()
            .starts_with("Corruption: "));
        assert!(Error::invalid_argument("/tmp/x: exists")
            .to_string()
            .starts_with("Invalid argument: "));
        let io_err = Error::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().starts_with("IO error: "));
    }

    #[test]
    fn test_io_at_includes_path() {
        let err = Error::io_at(
            Path::new("/data/db/LOCK"),
            io::Error::new(io::ErrorKind::WouldBlock, "already held"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/data/db/LOCK"));
        assert!(msg.contains("already held"));
        match err {
            Error::Io(inner) => assert_eq!(inner.kind(), io::ErrorKind::WouldBlock),
            other => panic!("expected Io, got {:?}", other),
        }
    }

    #[test]
    fn test_kind_taxonomy() {
        assert_eq!(Error::bad_argument("x").kind(), ErrorKind::Argument);
        assert_eq!(Error::illegal_state("x").kind(), ErrorKind::IllegalState);
        assert_eq!(Error::Busy("full".into()).kind(), ErrorKind::IllegalState);
        assert_eq!(Error::corruption("x").kind(), ErrorKind::Engine);
        assert_eq!(Error::invalid_argument("x").kind(), ErrorKind::Engine);
        assert_eq!(Error::internal("x").kind(), ErrorKind::Engine);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_corruption());
    }
}
