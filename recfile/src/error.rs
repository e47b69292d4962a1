//! Error types for Recfile

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Recfile error type
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A caller-supplied argument was rejected before touching the store
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The evaluation capability reported a failure
    #[error("Evaluation failed: {0}")]
    Capability(String),

    /// A command exceeded its time bound
    #[error("Command timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The caller's deadline passed before the work finished
    #[error("Operation deadline exceeded")]
    DeadlineExceeded,

    /// Another writer held the store lock for too long
    #[error("Timed out waiting for lock on {}", .0.display())]
    LockTimeout(PathBuf),

    /// The backup copy did not read back identical to the original
    #[error("Backup verification failed: {}", .0.display())]
    BackupMismatch(PathBuf),
}

/// Result type alias for Recfile operations
pub type Result<T> = std::result::Result<T, Error>;

/// The single failure tag every operation reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Filesystem stat/open/read/write/lock failure
    Io,
    /// Bad predicate, missing store, non-zero exit of the evaluation capability
    Capability,
    /// Command timeout, caller deadline or lock wait exceeded
    Timeout,
    /// Arguments rejected before any side effect
    InvalidArgument,
}

impl Error {
    /// Classify this error into its failure tag
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Io(_) | Error::Serialization(_) | Error::BackupMismatch(_) => FailureKind::Io,
            Error::InvalidArgument(_) => FailureKind::InvalidArgument,
            Error::Capability(_) => FailureKind::Capability,
            Error::Timeout(_) | Error::DeadlineExceeded | Error::LockTimeout(_) => {
                FailureKind::Timeout
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidArgument("fields must not be empty".to_string());
        assert_eq!(err.to_string(), "Invalid argument: fields must not be empty");

        let err = Error::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Command timed out after 1500ms");
    }

    #[test]
    fn test_error_kind() {
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(io.kind(), FailureKind::Io);
        assert_eq!(Error::DeadlineExceeded.kind(), FailureKind::Timeout);
        assert_eq!(
            Error::LockTimeout(PathBuf::from("people.rec.lock")).kind(),
            FailureKind::Timeout
        );
        assert_eq!(Error::Capability("bad".into()).kind(), FailureKind::Capability);
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::InvalidArgument).unwrap();
        assert_eq!(json, "\"invalid_argument\"");
    }
}
