//! Dose-Timing Engine Library
//!
//! This library provides the platform-free core of a two-dose medication
//! timing companion. It includes:
//! - Dosing window phase calculation with snooze and skip rules
//! - Rollover-corrected interval math for midnight-spanning nights
//! - Night session lifecycle with rollover, cutoff and prep-time boundaries
//! - Generic timed undo for user actions
//! - Offline retry queue with bounded exponential backoff
//! - Per-event cooldown rate limiting
//! - CLI command parsing and display utilities

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod interval;
pub mod phase;
pub mod queue;
pub mod rate_limit;
pub mod service;
pub mod session;
pub mod types;
pub mod undo;

// Re-export commonly used types for convenience
pub use types::{
    DoseAction, DosePhase, DoseWindowConfig, DoseWindowContext, SessionState, SessionStatus,
    TerminalState, Timestamp, UndoableAction,
};

pub use clock::{Clock, MockClock, SystemClock};
pub use config::{AppConfig, ConfigError};
pub use error::{ActionError, ErrorCategory, ValidationError};
pub use interval::{measure_interval, minutes_between, IntervalAnomaly, IntervalMeasurement};
pub use phase::{calculate_phase, PhaseCalculator, PhaseInput};

// Re-export session types
pub use session::{session_key, SessionEvent, SessionLifecycle, SessionLifecycleConfig};

// Re-export undo types
pub use undo::{RegisterOutcome, UndoConfig, UndoCoordinator, UndoResult};

// Re-export delivery types
pub use queue::{
    DroppedTask, FlushReport, MockTransport, PerformOutcome, QueuedTask, RetryQueue,
    RetryQueueConfig, Transport, TransportError, TransportResponse,
};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use service::{ActionOutcome, ActionService, RemoteAction};
