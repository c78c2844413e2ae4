//! Error types for Portage.
//!
//! This module provides a unified error type for all Portage operations,
//! with specific error variants for different failure modes.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for Portage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Portage.
#[derive(Error, Debug)]
pub enum Error {
    /// A replication session is already in flight.
    ///
    /// The underlying log storage is not safe for concurrent replication
    /// passes, so callers must not queue or retry automatically.
    #[error("replication already in progress")]
    ReplicationInProgress,

    /// Request body could not be parsed or was missing required fields
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Medium I/O failed during a transfer pass
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// Copied segment did not verify against its content address
    #[error("segment '{name}' failed verification after copy")]
    SegmentCorrupt {
        /// Segment file name (its expected content address)
        name: String,
    },

    /// The log did not report readiness within the configured window
    #[error("log not ready after {0} seconds")]
    LogNotReady(u64),

    /// Configuration file error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns whether this error is surfaced only on the push channel.
    ///
    /// Replication outcomes are detached from the request that triggered
    /// them: the HTTP response returned before the transfer finished, so
    /// these errors reach callers exclusively as an `error` broadcast.
    #[must_use]
    pub const fn is_broadcast_only(&self) -> bool {
        matches!(
            self,
            Self::Transfer(_) | Self::SegmentCorrupt { .. } | Self::LogNotReady(_)
        )
    }

    /// Returns whether this error should map to an HTTP 400 response.
    #[must_use]
    pub const fn is_bad_request(&self) -> bool {
        matches!(self, Self::ReplicationInProgress | Self::MalformedRequest(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message() {
        let err = Error::ReplicationInProgress;
        assert_eq!(err.to_string(), "replication already in progress");
        assert!(err.is_bad_request());
        assert!(!err.is_broadcast_only());
    }

    #[test]
    fn test_transfer_errors_are_broadcast_only() {
        assert!(Error::Transfer("medium removed".into()).is_broadcast_only());
        assert!(Error::LogNotReady(60).is_broadcast_only());
        assert!(Error::SegmentCorrupt { name: "ab12".into() }.is_broadcast_only());
        assert!(!Error::MalformedRequest("no source".into()).is_broadcast_only());
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
