//! Status/Result channel
//!
//! Every worker-thread engine call fills exactly one [`Status`] slot. Completion
//! delivery then maps it to the caller convention:
//!
//! | Status | Callback receives |
//! |---|---|
//! | `Ok(v)` | `Ok(Some(v))` |
//! | `NotFound` | `Ok(None)` (not an error) |
//! | `Failed(e)` | `Err(e)` |
//! | `Pending` | `Err(Internal)`: the work function never stored an outcome |
//!
//! Keeping not-found as its own state (rather than an empty value) is what lets
//! an empty stored value and a missing key stay distinguishable.

use crate::error::{Error, Result};

/// Outcome slot of one asynchronous operation.
#[derive(Debug)]
pub enum Status<T> {
    /// No outcome has been stored yet
    Pending,
    /// The engine call succeeded
    Ok(T),
    /// A point read found no entry for the key
    NotFound,
    /// The engine call failed
    Failed(Error),
}

impl<T> Default for Status<T> {
    fn default() -> Self {
        Status::Pending
    }
}

impl<T> Status<T> {
    /// Build a status from an engine call that has no not-found outcome.
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Status::Ok(value),
            Err(e) => Status::Failed(e),
        }
    }

    /// Build a status from a point lookup.
    pub fn from_lookup(result: Result<Option<T>>) -> Self {
        match result {
            Ok(Some(value)) => Status::Ok(value),
            Ok(None) => Status::NotFound,
            Err(e) => Status::Failed(e),
        }
    }

    /// True once an outcome (of any kind) has been stored
    pub fn is_settled(&self) -> bool {
        !matches!(self, Status::Pending)
    }

    /// True for the not-found outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Status::NotFound)
    }

    /// Map the success value, leaving the other outcomes untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Status<U> {
        match self {
            Status::Pending => Status::Pending,
            Status::Ok(value) => Status::Ok(f(value)),
            Status::NotFound => Status::NotFound,
            Status::Failed(e) => Status::Failed(e),
        }
    }

    /// Convert into the caller-visible result. Not-found becomes `Ok(None)`.
    pub fn into_result(self) -> Result<Option<T>> {
        match self {
            Status::Ok(value) => Ok(Some(value)),
            Status::NotFound => Ok(None),
            Status::Failed(e) => Err(e),
            Status::Pending => Err(Error::internal(
                "operation completed without storing an outcome",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn default_is_pending() {
        let status: Status<u32> = Status::default();
        assert!(!status.is_settled());
    }

    #[test]
    fn ok_maps_to_some() {
        let status = Status::from_result(Ok(7u32));
        assert!(status.is_settled());
        assert_eq!(status.into_result().unwrap(), Some(7));
    }

    #[test]
    fn not_found_is_not_an_error() {
        let status: Status<Vec<u8>> = Status::from_lookup(Ok(None));
        assert!(status.is_not_found());
        assert_eq!(status.into_result().unwrap(), None);
    }

    #[test]
    fn empty_value_is_distinct_from_not_found() {
        let status = Status::from_lookup(Ok(Some(Vec::<u8>::new())));
        assert!(!status.is_not_found());
        assert_eq!(status.into_result().unwrap(), Some(Vec::new()));
    }

    #[test]
    fn failure_carries_the_engine_message() {
        let status: Status<()> = Status::from_result(Err(Error::corruption("bad block")));
        let err = status.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Corruption: bad block");
        assert_eq!(err.kind(), ErrorKind::Engine);
    }

    #[test]
    fn pending_becomes_internal_error() {
        let status: Status<()> = Status::Pending;
        assert!(matches!(status.into_result(), Err(Error::Internal(_))));
    }

    #[test]
    fn map_preserves_not_found() {
        let status: Status<u8> = Status::NotFound;
        assert!(status.map(|v| v as u32 + 1).is_not_found());
        let status = Status::Ok(1u8).map(|v| v as u32 + 1);
        assert_eq!(status.into_result().unwrap(), Some(2));
    }
}
