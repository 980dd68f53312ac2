//! Error types for scope and handle operations.
//!
//! Individual operation failures are captured on their handle as an
//! [`OperationError`] and never thrown across task boundaries directly;
//! they surface to the caller only through
//! [`Scope::check_failures`](crate::Scope::check_failures) (wrapped as
//! [`Error::Aggregate`]) or [`Handle::result`](crate::Handle::result)
//! (wrapped as [`Error::Failed`]).

use std::sync::Arc;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure produced by a single operation.
///
/// Operations return this from their future to signal failure. The scope
/// retains the first failure (by completion order) behind an `Arc` so the
/// same error can be observed both through the aggregate check and through
/// the failing handle.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct OperationError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl OperationError {
    /// Create a failure with a message and no underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a failure wrapping an underlying error as its source.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for OperationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for OperationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Errors returned by scope and handle operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Submission was attempted after the scope left the `Open` phase.
    #[error("scope is closed to new submissions")]
    ScopeClosed,

    /// A result or failure check was requested before `join()` completed.
    #[error("scope has not been joined yet")]
    NotReady,

    /// The handle's operation was cancelled before producing a result.
    #[error("operation was cancelled")]
    Cancelled,

    /// The handle's operation failed.
    #[error("operation failed: {0}")]
    Failed(#[source] Arc<OperationError>),

    /// At least one operation in the scope failed. Wraps the first failure
    /// by completion order as its source.
    #[error("scope failed: {0}")]
    Aggregate(#[source] Arc<OperationError>),
}

impl Error {
    /// The originating operation failure, if this error carries one.
    pub fn operation_error(&self) -> Option<&OperationError> {
        match self {
            Self::Failed(err) | Self::Aggregate(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn operation_error_display_uses_message() {
        let err = OperationError::new("network down");
        assert_eq!(err.to_string(), "network down");
        assert_eq!(err.message(), "network down");
        assert!(err.source().is_none());
    }

    #[test]
    fn operation_error_chains_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = OperationError::with_source("fetch failed", io);
        assert_eq!(err.to_string(), "fetch failed");
        let source = err.source().expect("source should be present");
        assert_eq!(source.to_string(), "refused");
    }

    #[test]
    fn aggregate_wraps_first_failure_as_source() {
        let inner = Arc::new(OperationError::new("network down"));
        let err = Error::Aggregate(inner.clone());
        assert_eq!(err.to_string(), "scope failed: network down");
        let source = err.source().expect("source should be present");
        assert_eq!(source.to_string(), "network down");
        assert_eq!(
            err.operation_error().map(OperationError::message),
            Some("network down")
        );
    }

    #[test]
    fn non_failure_variants_have_no_operation_error() {
        assert!(Error::ScopeClosed.operation_error().is_none());
        assert!(Error::NotReady.operation_error().is_none());
        assert!(Error::Cancelled.operation_error().is_none());
    }
}
