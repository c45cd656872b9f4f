//! Session lifecycle configuration.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

fn default_rollover_hour() -> u32 {
    18
}

fn default_missed_check_in_cutoff_hours() -> i64 {
    4
}

/// Longest allowed missed check-in cutoff (one week).
pub const MAX_CUTOFF_HOURS: i64 = 7 * 24;

/// Session lifecycle configuration.
///
/// # Example
///
/// ```
/// use dosetap::session::SessionLifecycleConfig;
///
/// let config = SessionLifecycleConfig::default();
/// assert_eq!(config.rollover_hour, 18);
/// assert_eq!(config.missed_check_in_cutoff_hours, 4);
/// assert!(config.prep_time_minutes.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionLifecycleConfig {
    /// Local hour at which a new night begins.
    #[serde(default = "default_rollover_hour")]
    pub rollover_hour: u32,

    /// Hours after dose 1 (or session start, without dose 1) after which an
    /// open session expires.
    #[serde(default = "default_missed_check_in_cutoff_hours")]
    pub missed_check_in_cutoff_hours: i64,

    /// Local prep time (minutes after midnight); `None` disables the soft rollover.
    #[serde(default)]
    pub prep_time_minutes: Option<u32>,

    /// Host timezone as an offset from UTC in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for SessionLifecycleConfig {
    fn default() -> Self {
        Self {
            rollover_hour: default_rollover_hour(),
            missed_check_in_cutoff_hours: default_missed_check_in_cutoff_hours(),
            prep_time_minutes: None,
            utc_offset_minutes: 0,
        }
    }
}

impl SessionLifecycleConfig {
    /// Sets the prep time.
    #[must_use]
    pub fn with_prep_time(mut self, hour: u32, minute: u32) -> Self {
        self.prep_time_minutes = Some(hour * 60 + minute);
        self
    }

    /// Sets the host timezone offset.
    #[must_use]
    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    /// Host timezone.
    pub fn timezone(&self) -> Result<FixedOffset, ValidationError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            ValidationError::OutOfRange {
                field: "utc_offset_minutes".to_string(),
                message: format!("{} is not a valid offset", self.utc_offset_minutes),
            }
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.rollover_hour >= 24 {
            return Err(ValidationError::OutOfRange {
                field: "rollover_hour".to_string(),
                message: format!("{} must be in 0-23", self.rollover_hour),
            });
        }
        if !(1..=MAX_CUTOFF_HOURS).contains(&self.missed_check_in_cutoff_hours) {
            return Err(ValidationError::OutOfRange {
                field: "missed_check_in_cutoff_hours".to_string(),
                message: format!(
                    "{} must be in 1-{MAX_CUTOFF_HOURS}",
                    self.missed_check_in_cutoff_hours
                ),
            });
        }
        if let Some(prep) = self.prep_time_minutes {
            if prep >= 24 * 60 {
                return Err(ValidationError::OutOfRange {
                    field: "prep_time_minutes".to_string(),
                    message: format!("{prep} must be below 1440"),
                });
            }
        }
        self.timezone().map(|_| ())
    }
}
