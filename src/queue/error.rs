//! Transport error types.

use thiserror::Error;

use crate::error::ErrorCategory;

/// Failure returned by a [`Transport`](super::Transport).
///
/// Variants split into transient (retried by the queue) and permanent
/// (surfaced to the caller) classes; see [`TransportError::is_transient`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Network unreachable
    #[error("network unreachable")]
    Unreachable,

    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// Server-side failure (5xx, 408, 429)
    #[error("server error (status {status})")]
    Server {
        /// HTTP status
        status: u16,
    },

    /// Authorization failure (401, 403)
    #[error("unauthorized")]
    Unauthorized,

    /// Request rejected as invalid (400, 422)
    #[error("validation failed: {0}")]
    Validation(String),

    /// Any other client-side rejection
    #[error("client error (status {status}): {message}")]
    Client {
        /// HTTP status
        status: u16,
        /// Response message
        message: String,
    },
}

impl TransportError {
    /// Returns true if the failure is worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable | Self::Timeout | Self::Server { .. })
    }

    /// Category of the failure: transient errors are queued, the rest are
    /// surfaced as permanent.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        if self.is_transient() {
            ErrorCategory::Transient
        } else {
            ErrorCategory::Permanent
        }
    }

    /// Maps an HTTP status to an error; `None` for non-error statuses.
    pub fn from_status(status: u16, message: impl Into<String>) -> Option<Self> {
        let message = message.into();
        match status {
            401 | 403 => Some(Self::Unauthorized),
            400 | 422 => Some(Self::Validation(message)),
            408 | 429 | 500..=599 => Some(Self::Server { status }),
            400..=499 => Some(Self::Client { status, message }),
            _ => None,
        }
    }
}
