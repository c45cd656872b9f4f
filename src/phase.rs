//! Dosing phase calculation.
//!
//! Pure mapping from a session snapshot and "now" to a [`DoseWindowContext`].
//! No side effects and no failure path: blocked states are encoded in the
//! returned context.

use chrono::{DateTime, Duration, Utc};

use crate::interval::measure_interval;
use crate::types::{DosePhase, DoseWindowConfig, DoseWindowContext, SessionState, Timestamp};

/// Session fields the phase depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseInput {
    /// Dose 1 time
    pub dose1_at: Option<Timestamp>,
    /// Dose 2 time
    pub dose2_at: Option<Timestamp>,
    /// Whether dose 2 was skipped
    pub dose2_skipped: bool,
    /// Snoozes applied
    pub snooze_count: u8,
    /// Final wake time
    pub wake_final_at: Option<Timestamp>,
    /// Whether the check-in was saved
    pub check_in_completed: bool,
}

impl From<&SessionState> for PhaseInput {
    fn from(state: &SessionState) -> Self {
        Self {
            dose1_at: state.dose1_at,
            dose2_at: state.dose2_at,
            dose2_skipped: state.dose2_skipped,
            snooze_count: state.snooze_count,
            wake_final_at: state.wake_final_at,
            check_in_completed: state.check_in_completed,
        }
    }
}

/// Phase calculator bound to one window configuration.
#[derive(Debug, Clone, Default)]
pub struct PhaseCalculator {
    config: DoseWindowConfig,
}

impl PhaseCalculator {
    /// Creates a calculator for `config`.
    pub fn new(config: DoseWindowConfig) -> Self {
        Self { config }
    }

    /// Returns the window configuration.
    pub fn config(&self) -> &DoseWindowConfig {
        &self.config
    }

    /// Computes the window context at `now`.
    pub fn phase(&self, now: Timestamp, input: &PhaseInput) -> DoseWindowContext {
        calculate_phase(&self.config, now, input)
    }

    /// Computes the window context for a session at `now`.
    pub fn phase_for(&self, now: Timestamp, state: &SessionState) -> DoseWindowContext {
        calculate_phase(&self.config, now, &PhaseInput::from(state))
    }
}

/// Computes the window context at `now`.
pub fn calculate_phase(
    config: &DoseWindowConfig,
    now: Timestamp,
    input: &PhaseInput,
) -> DoseWindowContext {
    let Some(dose1_at) = input.dose1_at else {
        return DoseWindowContext {
            phase: DosePhase::NoDose1,
            elapsed_minutes: 0,
            remaining_minutes: None,
            target_at: None,
            snooze_allowed: false,
            skip_allowed: false,
            late_override_required: false,
            snooze_count: input.snooze_count,
            interval_anomaly: false,
        };
    };

    let measurement = measure_interval(dose1_at, now);
    // Dose 1 "in the future" reads as zero elapsed.
    let elapsed = measurement.minutes.max(0);

    let phase = phase_from_elapsed(config, elapsed, input);

    let remaining_minutes = match phase {
        DosePhase::Active | DosePhase::NearClose => Some(config.max_interval_minutes - elapsed),
        _ => None,
    };

    let snooze_allowed = phase == DosePhase::Active
        && remaining_minutes.is_some_and(|r| r > config.near_close_threshold_minutes)
        && input.snooze_count < config.max_snoozes;

    let skip_allowed = !matches!(phase, DosePhase::NoDose1 | DosePhase::Completed);

    DoseWindowContext {
        phase,
        elapsed_minutes: elapsed,
        remaining_minutes,
        target_at: Some(target_at(config, dose1_at, input.snooze_count)),
        snooze_allowed,
        skip_allowed,
        late_override_required: phase == DosePhase::Closed,
        snooze_count: input.snooze_count,
        interval_anomaly: !measurement.is_trusted(),
    }
}

fn phase_from_elapsed(config: &DoseWindowConfig, elapsed: i64, input: &PhaseInput) -> DosePhase {
    if input.dose2_at.is_some() || input.dose2_skipped {
        DosePhase::Completed
    } else if input.wake_final_at.is_some() && !input.check_in_completed {
        DosePhase::Finalizing
    } else if elapsed < config.min_interval_minutes {
        DosePhase::BeforeWindow
    } else if elapsed >= config.max_interval_minutes {
        DosePhase::Closed
    } else if config.max_interval_minutes - elapsed <= config.near_close_threshold_minutes {
        DosePhase::NearClose
    } else {
        DosePhase::Active
    }
}

/// Reminder target: default target plus snoozes, never past window close.
pub fn target_at(config: &DoseWindowConfig, dose1_at: Timestamp, snooze_count: u8) -> Timestamp {
    let offset = config
        .default_target_minutes
        .saturating_add(i64::from(snooze_count).saturating_mul(config.snooze_step_minutes))
        .min(config.max_interval_minutes);
    Duration::try_minutes(offset)
        .and_then(|offset| dose1_at.checked_add_signed(offset))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
