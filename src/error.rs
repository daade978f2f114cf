use std::fmt;
use std::time::Duration;

/// Errors that can occur inside the audit publishing path.
///
/// None of these ever reach request-handling code: every one of them ends in
/// a log line at the point where it surfaces.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The event could not be serialized to JSON.
    #[error("failed to serialize audit event: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The caller-supplied data bag did not match the audit schema.
    #[error("malformed audit data: {0}")]
    MalformedData(#[source] serde_json::Error),

    /// The outbound queue is at capacity; the newest event was dropped.
    #[error("audit queue full")]
    QueueFull,

    /// The publisher has been closed.
    #[error("audit publisher closed")]
    Closed,

    /// The transport failed to deliver a batch.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Shutdown did not finish before its deadline.
    #[error("audit shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Error returned by a [`Transport`](crate::audit::Transport).
///
/// # Examples
///
/// ```
/// use request_audit::{TransportError, TransportErrorKind};
///
/// let error = TransportError::with_message(TransportErrorKind::Rejected, "403 Forbidden");
/// assert_eq!(error.kind(), TransportErrorKind::Rejected);
/// assert_eq!(error.to_string(), "transport error (rejected by sink): 403 Forbidden");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport error ({kind}){}", detail(.message))]
pub struct TransportError {
    kind: TransportErrorKind,
    message: Option<String>,
}

fn detail(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|message| format!(": {}", message))
        .unwrap_or_default()
}

impl TransportError {
    /// Creates a new transport error with the specified kind.
    pub fn new(kind: TransportErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates a new transport error with a custom message.
    pub fn with_message(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Returns the error message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Why a batch could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The sink could not be reached.
    Network,
    /// No credentials could be obtained for the sink.
    Auth,
    /// The sink answered but refused the batch.
    Rejected,
    /// The request did not complete in time.
    Timeout,
    /// The transport has been shut down.
    Closed,
}

impl TransportErrorKind {
    /// Returns a short description of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network failure",
            Self::Auth => "credentials unavailable",
            Self::Rejected => "rejected by sink",
            Self::Timeout => "timed out",
            Self::Closed => "transport closed",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
