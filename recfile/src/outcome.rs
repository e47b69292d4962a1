//! Uniform result shape returned by every store operation

use crate::error::{Error, FailureKind};
use serde::{Deserialize, Serialize};

/// Result of one store operation.
///
/// Built once per invocation and handed back to the caller. A failed
/// outcome always carries a [`FailureKind`]; successful ones never do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Whether the operation succeeded
    pub success: bool,
    /// Records, confirmation text or captured stdout
    pub output: String,
    /// Error text or captured stderr
    pub error: String,
    /// Failure tag (absent on success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

impl Outcome {
    /// Create a successful outcome
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: String::new(),
            kind: None,
        }
    }

    /// Create a failed outcome with an error message
    pub fn failure(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.into(),
            kind: Some(kind),
        }
    }

    /// Attach partial output to a failure (e.g. stdout of a failed command)
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }
}

impl From<Error> for Outcome {
    fn from(err: Error) -> Self {
        let message = match &err {
            // Underlying OS text only, so callers see e.g. "Permission denied (os error 13)"
            Error::Io(io) => io.to_string(),
            other => other.to_string(),
        };
        Outcome::failure(err.kind(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_outcome() {
        let outcome = Outcome::ok("Test output");
        assert!(outcome.success);
        assert_eq!(outcome.output, "Test output");
        assert!(outcome.error.is_empty());
        assert_eq!(outcome.kind, None);
    }

    #[test]
    fn test_failure_outcome() {
        let outcome = Outcome::failure(FailureKind::Capability, "Test error");
        assert!(!outcome.success);
        assert!(outcome.output.is_empty());
        assert_eq!(outcome.error, "Test error");
        assert_eq!(outcome.kind, Some(FailureKind::Capability));
    }

    #[test]
    fn test_from_io_error_keeps_os_text() {
        let err = Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "permission denied",
        ));
        let outcome = Outcome::from(err);
        assert_eq!(outcome.error, "permission denied");
        assert_eq!(outcome.kind, Some(FailureKind::Io));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(Outcome::ok("done")).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "output": "done", "error": ""}));

        let json = serde_json::to_value(Outcome::failure(FailureKind::Timeout, "slow")).unwrap();
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["success"], false);
    }
}
