//! Core data types for the dose-timing engine.
//!
//! This module defines the data structures used for:
//! - Dosing window configuration with validation
//! - Dosing phase and the derived window context
//! - Night session state and its terminal states
//! - Undoable user actions and remote (side-effecting) actions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::interval::{measure_interval, IntervalMeasurement, MAX_ROLLOVER_MINUTES};

/// Absolute UTC instant used everywhere in the engine.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// DosePhase
// ============================================================================

/// Dosing phase of a night, derived from elapsed time since dose 1.
///
/// Variants are declared in time order so `PartialOrd` follows the
/// `NoDose1 < BeforeWindow < Active < NearClose < Closed` progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DosePhase {
    /// Dose 1 has not been taken
    NoDose1,
    /// Dose 1 taken, minimum interval not yet reached
    BeforeWindow,
    /// Dose 2 may be taken
    Active,
    /// Last stretch of the window, snoozing disabled
    NearClose,
    /// Window elapsed; dose 2 requires an explicit late override
    Closed,
    /// Final wake logged, waiting for the morning check-in
    Finalizing,
    /// Dose 2 taken or skipped
    Completed,
}

impl DosePhase {
    /// Returns the string representation of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            DosePhase::NoDose1 => "no_dose1",
            DosePhase::BeforeWindow => "before_window",
            DosePhase::Active => "active",
            DosePhase::NearClose => "near_close",
            DosePhase::Closed => "closed",
            DosePhase::Finalizing => "finalizing",
            DosePhase::Completed => "completed",
        }
    }

    /// Returns true while dose 2 can be taken without any override.
    pub fn is_window_open(&self) -> bool {
        matches!(self, DosePhase::Active | DosePhase::NearClose)
    }

    /// Returns true if no further dose decision is pending for this session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DosePhase::NoDose1 | DosePhase::Completed)
    }
}

impl Default for DosePhase {
    fn default() -> Self {
        DosePhase::NoDose1
    }
}

impl std::fmt::Display for DosePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DoseWindowConfig
// ============================================================================

fn default_min_interval_minutes() -> i64 {
    150
}

fn default_max_interval_minutes() -> i64 {
    240
}

fn default_near_close_threshold_minutes() -> i64 {
    15
}

fn default_target_minutes() -> i64 {
    165
}

fn default_snooze_step_minutes() -> i64 {
    10
}

fn default_max_snoozes() -> u8 {
    3
}

/// Dosing window configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseWindowConfig {
    /// Earliest allowed dose 2, in minutes after dose 1
    #[serde(default = "default_min_interval_minutes")]
    pub min_interval_minutes: i64,
    /// Window close, in minutes after dose 1
    #[serde(default = "default_max_interval_minutes")]
    pub max_interval_minutes: i64,
    /// Final stretch of the window during which snoozing is disabled
    #[serde(default = "default_near_close_threshold_minutes")]
    pub near_close_threshold_minutes: i64,
    /// Default reminder target, in minutes after dose 1
    #[serde(default = "default_target_minutes")]
    pub default_target_minutes: i64,
    /// Delay added to the reminder target per snooze
    #[serde(default = "default_snooze_step_minutes")]
    pub snooze_step_minutes: i64,
    /// Maximum snoozes per session
    #[serde(default = "default_max_snoozes")]
    pub max_snoozes: u8,
}

impl Default for DoseWindowConfig {
    fn default() -> Self {
        Self {
            min_interval_minutes: default_min_interval_minutes(),
            max_interval_minutes: default_max_interval_minutes(),
            near_close_threshold_minutes: default_near_close_threshold_minutes(),
            default_target_minutes: default_target_minutes(),
            snooze_step_minutes: default_snooze_step_minutes(),
            max_snoozes: default_max_snoozes(),
        }
    }
}

impl DoseWindowConfig {
    /// Validates the window invariants.
    ///
    /// `0 < min < max` and `near_close_threshold < max - min`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.min_interval_minutes <= 0 {
            return Err(ValidationError::InvalidConfig(
                "min_interval_minutes must be positive".to_string(),
            ));
        }
        if self.min_interval_minutes >= self.max_interval_minutes {
            return Err(ValidationError::InvalidConfig(format!(
                "min_interval_minutes ({}) must be less than max_interval_minutes ({})",
                self.min_interval_minutes, self.max_interval_minutes
            )));
        }
        if self.near_close_threshold_minutes < 0
            || self.near_close_threshold_minutes
                >= self.max_interval_minutes - self.min_interval_minutes
        {
            return Err(ValidationError::InvalidConfig(format!(
                "near_close_threshold_minutes ({}) must be within the window width ({})",
                self.near_close_threshold_minutes,
                self.max_interval_minutes - self.min_interval_minutes
            )));
        }
        if self.max_interval_minutes > MAX_ROLLOVER_MINUTES {
            return Err(ValidationError::InvalidConfig(format!(
                "max_interval_minutes ({}) must not exceed {MAX_ROLLOVER_MINUTES}",
                self.max_interval_minutes
            )));
        }
        if !(0..=self.max_interval_minutes).contains(&self.default_target_minutes) {
            return Err(ValidationError::InvalidConfig(format!(
                "default_target_minutes ({}) must be within 0-{}",
                self.default_target_minutes, self.max_interval_minutes
            )));
        }
        if !(0..=self.max_interval_minutes).contains(&self.snooze_step_minutes) {
            return Err(ValidationError::InvalidConfig(format!(
                "snooze_step_minutes ({}) must be within 0-{}",
                self.snooze_step_minutes, self.max_interval_minutes
            )));
        }
        Ok(())
    }

    /// Width of the dosing window in minutes.
    pub fn window_width_minutes(&self) -> i64 {
        self.max_interval_minutes - self.min_interval_minutes
    }
}

// ============================================================================
// DoseWindowContext
// ============================================================================

/// Rendering decision derived from a session snapshot at a given instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseWindowContext {
    /// Current phase
    pub phase: DosePhase,
    /// Minutes since dose 1 (0 when dose 1 is missing)
    pub elapsed_minutes: i64,
    /// Minutes until the window closes; only meaningful in `Active`/`NearClose`
    pub remaining_minutes: Option<i64>,
    /// Reminder target (dose 1 + default target + snoozes), clamped to window close
    pub target_at: Option<Timestamp>,
    /// Whether a snooze may be applied now
    pub snooze_allowed: bool,
    /// Whether dose 2 may be skipped now
    pub skip_allowed: bool,
    /// Whether recording dose 2 requires an explicit late override
    pub late_override_required: bool,
    /// Snoozes already applied this session
    pub snooze_count: u8,
    /// Set when elapsed time could not be explained by a single midnight rollover
    pub interval_anomaly: bool,
}

// ============================================================================
// SessionState
// ============================================================================

/// Terminal state recorded when a session closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// Check-in completed after dose 2 (or with no dose 2 decision)
    Completed,
    /// Check-in completed after dose 2 was skipped
    Skipped,
    /// Missed check-in cutoff elapsed
    Expired,
    /// Prep-time soft rollover closed the session
    RolledOver,
}

impl TerminalState {
    /// Returns the string representation of the terminal state.
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalState::Completed => "completed",
            TerminalState::Skipped => "skipped",
            TerminalState::Expired => "expired",
            TerminalState::RolledOver => "rolled_over",
        }
    }
}

/// Session-level state, distinct from the dosing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Night in progress
    Active,
    /// Final wake logged, check-in pending
    Finalizing,
    /// Closed; immutable
    Closed,
}

/// State of one "night", persisted by an external storage collaborator.
///
/// All timestamps are absolute UTC instants. Storage never rewrites them;
/// rollover correction happens only when intervals are measured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Grouping identifier for the night (`YYYY-MM-DD` of the evening)
    pub session_key: String,
    /// When the session was opened
    pub started_at: Timestamp,
    /// Dose 1 time
    pub dose1_at: Option<Timestamp>,
    /// Dose 2 time
    pub dose2_at: Option<Timestamp>,
    /// Whether dose 2 was explicitly skipped
    pub dose2_skipped: bool,
    /// Snoozes applied
    pub snooze_count: u8,
    /// Final wake time
    pub wake_final_at: Option<Timestamp>,
    /// Whether the morning check-in was saved
    pub check_in_completed: bool,
    /// Close time; set exactly once
    pub closed_at: Option<Timestamp>,
    /// Terminal state; set together with `closed_at`
    pub terminal_state: Option<TerminalState>,
    /// Doses beyond the second (index >= 3), never merged into `dose2_at`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_doses: Vec<Timestamp>,
    /// Whether dose 2 was recorded early or through a late override
    #[serde(default)]
    pub dose2_override: bool,
}

impl SessionState {
    /// Creates a new open session.
    pub fn new(session_key: impl Into<String>, started_at: Timestamp) -> Self {
        Self {
            session_key: session_key.into(),
            started_at,
            dose1_at: None,
            dose2_at: None,
            dose2_skipped: false,
            snooze_count: 0,
            wake_final_at: None,
            check_in_completed: false,
            closed_at: None,
            terminal_state: None,
            extra_doses: Vec::new(),
            dose2_override: false,
        }
    }

    /// Returns true once the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    /// Session-level status.
    pub fn status(&self) -> SessionStatus {
        if self.is_closed() {
            SessionStatus::Closed
        } else if self.wake_final_at.is_some() && !self.check_in_completed {
            SessionStatus::Finalizing
        } else {
            SessionStatus::Active
        }
    }

    /// Number of doses recorded this session (dose 1, dose 2 and extras).
    pub fn dose_count(&self) -> usize {
        usize::from(self.dose1_at.is_some())
            + usize::from(self.dose2_at.is_some())
            + self.extra_doses.len()
    }

    /// Displayed dose 1 → dose 2 interval, rollover-corrected.
    pub fn dose_interval(&self) -> Option<IntervalMeasurement> {
        match (self.dose1_at, self.dose2_at) {
            (Some(d1), Some(d2)) => Some(measure_interval(d1, d2)),
            _ => None,
        }
    }
}

// ============================================================================
// Actions
// ============================================================================

/// A user action that can be reverted during the undo window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UndoableAction {
    /// Dose 1 was recorded at `at`
    TakeDose1 {
        /// Dose time
        at: Timestamp,
    },
    /// Dose 2 was recorded at `at`
    TakeDose2 {
        /// Dose time
        at: Timestamp,
    },
    /// Dose 2 was skipped
    SkipDose {
        /// Optional reason given by the user
        reason: Option<String>,
    },
    /// A snooze was applied; `previous_count` is restored on undo
    Snooze {
        /// Snooze count before the snooze
        previous_count: u8,
    },
}

/// Side-effecting action delivered to the remote backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DoseAction {
    /// A dose was taken
    TakeDose {
        /// Caller-assigned key so retries are safe
        idempotency_key: Uuid,
        /// Session the dose belongs to
        session_key: String,
        /// 1, 2, or >= 3 for extra doses
        dose_index: u8,
        /// Dose time
        at: Timestamp,
    },
    /// Dose 2 was skipped
    SkipDose {
        /// Caller-assigned key so retries are safe
        idempotency_key: Uuid,
        /// Session the skip belongs to
        session_key: String,
        /// Optional reason
        reason: Option<String>,
    },
    /// A night event was logged (bathroom, lights out, ...)
    LogEvent {
        /// Caller-assigned key so retries are safe
        idempotency_key: Uuid,
        /// Session the event belongs to
        session_key: String,
        /// Event type name, used as the rate limiting key
        event_type: String,
        /// Event time
        at: Timestamp,
    },
}

impl DoseAction {
    /// Creates a dose action with a fresh idempotency key.
    pub fn take_dose(session_key: impl Into<String>, dose_index: u8, at: Timestamp) -> Self {
        DoseAction::TakeDose {
            idempotency_key: Uuid::new_v4(),
            session_key: session_key.into(),
            dose_index,
            at,
        }
    }

    /// Creates a skip action with a fresh idempotency key.
    pub fn skip_dose(session_key: impl Into<String>, reason: Option<String>) -> Self {
        DoseAction::SkipDose {
            idempotency_key: Uuid::new_v4(),
            session_key: session_key.into(),
            reason,
        }
    }

    /// Creates an event-log action with a fresh idempotency key.
    pub fn log_event(
        session_key: impl Into<String>,
        event_type: impl Into<String>,
        at: Timestamp,
    ) -> Self {
        DoseAction::LogEvent {
            idempotency_key: Uuid::new_v4(),
            session_key: session_key.into(),
            event_type: event_type.into(),
            at,
        }
    }

    /// Idempotency key of the action.
    pub fn idempotency_key(&self) -> Uuid {
        match self {
            DoseAction::TakeDose {
                idempotency_key, ..
            }
            | DoseAction::SkipDose {
                idempotency_key, ..
            }
            | DoseAction::LogEvent {
                idempotency_key, ..
            } => *idempotency_key,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
