//! Error taxonomy for the diagnostics engine.
//!
//! Staleness never shows up here: a result computed for an outdated
//! generation is dropped inside the coordinator and nobody is told.

use settle_types::DocumentKey;

/// Errors surfaced to a caller of the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiagnosticsError {
    /// The backend cannot answer pull-style diagnostic queries at all.
    /// Reported once per session; later pulls fail fast with the same error.
    #[error("pull diagnostics are not supported: {reason}")]
    Unsupported { reason: String },
    /// The backend failed for this cycle. Later edits retry normally.
    #[error("diagnostic computation failed: {message}")]
    ComputationFailed { message: String },
    /// The document closed while the request was waiting for a result.
    #[error("document closed before diagnostics were available")]
    ClosedDuringWait,
    #[error("document is not open: {key}")]
    UnknownDocument { key: DocumentKey },
}

/// Errors a [`DiagnosticBackend`](crate::DiagnosticBackend) may return.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend does not support diagnostics requests: {reason}")]
    Unsupported { reason: String },
    #[error("{message}")]
    Failed { message: String },
}

impl BackendError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }
}

impl From<BackendError> for DiagnosticsError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unsupported { reason } => Self::Unsupported { reason },
            BackendError::Failed { message } => Self::ComputationFailed { message },
        }
    }
}
