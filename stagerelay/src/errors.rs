//! Error types for stagerelay.
//!
//! One error type per failure class of a stage invocation, plus the
//! umbrella [`RelayError`] returned by the executor and the CLI:
//!
//! | Error | Terminal for the invocation | Exit code |
//! |---|---|---|
//! | [`ValidationError`] | yes, before any side effect | 2 |
//! | [`ProviderError`] | yes | 1 |
//! | [`PersistenceError`] | yes | 1 |
//! | [`DispatchError`] | no, logged as a warning | 0 |
//! | [`ReportError`] | no, logged as a warning | 0 |

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Broad classification of a [`RelayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing input.
    Validation,
    /// Text generation failed.
    Provider,
    /// Artifact write failed.
    Persistence,
    /// Next-stage trigger failed to send.
    Dispatch,
    /// Status update failed to send.
    Report,
}

impl ErrorKind {
    /// Returns the wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Provider => "provider",
            Self::Persistence => "persistence",
            Self::Dispatch => "dispatch",
            Self::Report => "report",
        }
    }

    /// Returns true if this kind aborts the current stage.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Validation | Self::Provider | Self::Persistence)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for stagerelay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Input or configuration was rejected.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The analysis provider failed.
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// The result store failed.
    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    /// The dispatcher failed.
    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    /// The status sink failed.
    #[error("{0}")]
    Report(#[from] ReportError),
}

impl RelayError {
    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Provider(_) => ErrorKind::Provider,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Dispatch(_) => ErrorKind::Dispatch,
            Self::Report(_) => ErrorKind::Report,
        }
    }

    /// Returns the process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Validation => 2,
            ErrorKind::Provider | ErrorKind::Persistence => 1,
            ErrorKind::Dispatch | ErrorKind::Report => 0,
        }
    }
}

/// Error raised when input or configuration fails validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Validation error: {message}")]
pub struct ValidationError {
    /// The error message.
    pub message: String,
    /// The offending field, when one can be named.
    pub field: Option<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    /// Creates an error for a missing or empty required field.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("required field '{field}' is missing or empty"),
            field: Some(field),
        }
    }

    /// Creates an error for a field with an unusable value.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        let field = field.into();
        Self {
            message: format!("field '{field}' is invalid: {reason}"),
            field: Some(field),
        }
    }
}

/// Errors from the text-generation capability.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The request could not be sent or the connection failed.
    #[error("Provider request failed: {0}")]
    Request(String),

    /// The provider answered with a non-success status.
    #[error("Provider returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// No response arrived within the configured timeout.
    #[error("Provider timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The provider returned no usable text.
    #[error("Provider returned empty content")]
    EmptyContent,

    /// The response body could not be understood.
    #[error("Provider response malformed: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Builds a status error, truncating long bodies.
    #[must_use]
    pub fn status(status: u16, body: &str) -> Self {
        const MAX_BODY: usize = 512;
        let body = if body.len() > MAX_BODY {
            let mut end = MAX_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &body[..end])
        } else {
            body.to_string()
        };
        Self::Status { status, body }
    }
}

/// Error raised when a result store write fails.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem I/O failed.
    #[error("Failed to persist artifact at {}: {source}", path.display())]
    Io {
        /// The path being written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The artifact was rejected by the store.
    #[error("Artifact rejected by store: {0}")]
    Rejected(String),

    /// The store did not finish the write within the configured timeout.
    #[error("Store write timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },
}

impl PersistenceError {
    /// Creates an I/O persistence error.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Error raised when the next-stage trigger cannot be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The request could not be sent.
    #[error("Dispatch request failed: {0}")]
    Transport(String),

    /// The endpoint did not acknowledge the event.
    #[error("Dispatch rejected with HTTP {status}")]
    Rejected {
        /// HTTP status code.
        status: u16,
    },

    /// The dispatcher is not configured.
    #[error("Dispatcher not configured: {0}")]
    NotConfigured(String),

    /// Reading or writing the outbox failed.
    #[error("Outbox error: {0}")]
    Outbox(String),
}

impl DispatchError {
    /// Returns true if re-sending the same event may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status } => *status >= 500 || *status == 408 || *status == 429,
            Self::NotConfigured(_) | Self::Outbox(_) => false,
        }
    }
}

/// Error raised when a status update cannot be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    /// The request could not be sent.
    #[error("Status report failed: {0}")]
    Transport(String),

    /// The dashboard did not accept the update.
    #[error("Status report rejected with HTTP {status}")]
    Rejected {
        /// HTTP status code.
        status: u16,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_missing_names_field() {
        let err = ValidationError::missing("stage1_output");
        assert_eq!(err.field.as_deref(), Some("stage1_output"));
        assert!(err.to_string().contains("stage1_output"));
    }

    #[test]
    fn test_exit_codes() {
        let validation: RelayError = ValidationError::new("bad").into();
        let provider: RelayError = ProviderError::EmptyContent.into();
        let persistence: RelayError =
            PersistenceError::io("results/x.txt", std::io::Error::other("disk full")).into();
        let dispatch: RelayError = DispatchError::Rejected { status: 404 }.into();

        assert_eq!(validation.exit_code(), 2);
        assert_eq!(provider.exit_code(), 1);
        assert_eq!(persistence.exit_code(), 1);
        assert_eq!(dispatch.exit_code(), 0);
    }

    #[test]
    fn test_kind_terminality() {
        assert!(ErrorKind::Validation.is_terminal());
        assert!(ErrorKind::Provider.is_terminal());
        assert!(ErrorKind::Persistence.is_terminal());
        assert!(!ErrorKind::Dispatch.is_terminal());
        assert!(!ErrorKind::Report.is_terminal());
    }

    #[test]
    fn test_dispatch_retryability() {
        assert!(DispatchError::Transport("reset".to_string()).is_retryable());
        assert!(DispatchError::Rejected { status: 502 }.is_retryable());
        assert!(DispatchError::Rejected { status: 429 }.is_retryable());
        assert!(!DispatchError::Rejected { status: 404 }.is_retryable());
        assert!(!DispatchError::NotConfigured("token".to_string()).is_retryable());
    }

    #[test]
    fn test_provider_status_truncates_body() {
        let body = "é".repeat(600);
        let err = ProviderError::status(500, &body);
        match err {
            ProviderError::Status { status, body } => {
                assert_eq!(status, 500);
                assert!(body.ends_with("..."));
                assert!(body.len() <= 515);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
