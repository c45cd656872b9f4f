//! Error types for the dose-timing engine.
//!
//! Errors fall into four categories:
//! - Validation: local, non-retriable, returned to the caller synchronously
//! - Transient: retriable, absorbed by the retry queue
//! - Permanent: non-retriable remote failures, surfaced immediately
//! - Invariant: corrupted upstream data, reported as diagnostics rather than errors

use thiserror::Error;

use crate::queue::TransportError;

/// Broad error class, used by callers to pick the right user feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller mistake or blocked state; show an error, never retry
    Validation,
    /// Retriable failure; show a "saved offline" indicator
    Transient,
    /// Non-retriable remote failure; show an error
    Permanent,
    /// Corrupted data; log and flag
    Invariant,
}

/// Local validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Dose 2 attempted after the window closed without an override.
    #[error("dosing window closed {elapsed_minutes} minutes after dose 1; a confirmed late override is required")]
    WindowExceeded {
        /// Minutes since dose 1
        elapsed_minutes: i64,
    },

    /// Dose 2 attempted before the minimum interval without confirming.
    #[error("dose 2 is {elapsed_minutes} minutes after dose 1, before the {min_minutes}-minute minimum")]
    TooEarly {
        /// Minutes since dose 1
        elapsed_minutes: i64,
        /// Configured minimum interval
        min_minutes: i64,
    },

    /// Snooze count already at the limit.
    #[error("snooze limit of {max} reached")]
    SnoozeLimitReached {
        /// Configured maximum
        max: u8,
    },

    /// Snoozing is not possible in the current phase.
    #[error("snooze is not available in phase '{phase}'")]
    SnoozeUnavailable {
        /// Phase name
        phase: String,
    },

    /// Skipping is not possible in the current phase.
    #[error("skip is not available in phase '{phase}'")]
    SkipUnavailable {
        /// Phase name
        phase: String,
    },

    /// Dose 1 required but missing.
    #[error("dose 1 has not been recorded")]
    Dose1Missing,

    /// Dose 1 recorded twice.
    #[error("dose 1 is already recorded for session '{0}'")]
    Dose1AlreadyRecorded(String),

    /// Mutation attempted on a closed session.
    #[error("session '{0}' is closed")]
    SessionClosed(String),

    /// No session exists yet.
    #[error("no active session")]
    NoActiveSession,

    /// Value outside its allowed range.
    #[error("value for '{field}' out of range: {message}")]
    OutOfRange {
        /// Field name
        field: String,
        /// Explanation
        message: String,
    },

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ValidationError {
    /// Returns true if this error means the session can no longer be mutated.
    #[must_use]
    pub fn is_session_closed(&self) -> bool {
        matches!(self, Self::SessionClosed(_))
    }
}

/// Errors returned by the retry queue and action service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// Rejected locally before any delivery attempt.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Remote rejected the action; never queued.
    #[error("action rejected permanently: {0}")]
    Permanent(TransportError),

    /// Retries exhausted; the task was dropped from the queue.
    #[error("action dropped after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Delivery attempts made from the queue
        attempts: u8,
        /// Error from the last attempt
        last_error: TransportError,
    },
}

impl ActionError {
    /// Category used to choose user feedback.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Permanent(_) | Self::RetriesExhausted { .. } => ErrorCategory::Permanent,
        }
    }
}
