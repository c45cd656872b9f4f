//! Interval arithmetic with midnight-rollover correction.
//!
//! [`measure_interval`] is the single source of truth for every displayed
//! interval. A negative raw difference gets one +24h correction; if the
//! corrected value is still implausible the measurement is flagged as an
//! anomaly instead of being silently clamped.

use crate::error::ErrorCategory;
use crate::types::Timestamp;

/// Minutes in one day.
pub const MINUTES_PER_DAY: i64 = 24 * 60;

/// Largest interval (in minutes) that a single rollover correction may produce.
pub const MAX_ROLLOVER_MINUTES: i64 = 12 * 60;

/// Why a measurement could not be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalAnomaly {
    /// Negative difference that one midnight rollover does not explain
    UnexplainedNegative {
        /// Raw `end - start` in minutes
        raw_minutes: i64,
    },
}

impl IntervalAnomaly {
    /// Always [`ErrorCategory::Invariant`]: the data is corrupt, not the user.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Invariant
    }
}

/// Result of measuring an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalMeasurement {
    /// Interval in minutes; the raw value when an anomaly is flagged
    pub minutes: i64,
    /// Whether the rollover correction was applied
    pub rolled_over: bool,
    /// Set when the input ordering is corrupt
    pub anomaly: Option<IntervalAnomaly>,
}

impl IntervalMeasurement {
    /// Returns true when the measurement can be displayed as-is.
    pub fn is_trusted(&self) -> bool {
        self.anomaly.is_none()
    }
}

/// Measures `end - start` in whole minutes without ever panicking.
pub fn measure_interval(start: Timestamp, end: Timestamp) -> IntervalMeasurement {
    let raw = (end - start).num_minutes();
    if raw >= 0 {
        return IntervalMeasurement {
            minutes: raw,
            rolled_over: false,
            anomaly: None,
        };
    }

    let rolled = raw + MINUTES_PER_DAY;
    if (0..=MAX_ROLLOVER_MINUTES).contains(&rolled) {
        tracing::debug!(raw, rolled, "applied midnight rollover correction");
        IntervalMeasurement {
            minutes: rolled,
            rolled_over: true,
            anomaly: None,
        }
    } else {
        tracing::error!(
            %start,
            %end,
            raw,
            "interval is negative and not explained by a midnight rollover"
        );
        IntervalMeasurement {
            minutes: raw,
            rolled_over: false,
            anomaly: Some(IntervalAnomaly::UnexplainedNegative { raw_minutes: raw }),
        }
    }
}

/// Minutes from `start` to `end`, rollover-corrected.
///
/// Directional: `minutes_between(a, b)` and `minutes_between(b, a)` differ.
///
/// # Panics
///
/// In debug builds, panics when the ordering is anomalous. Release builds
/// return the raw value; use [`measure_interval`] to observe the flag.
pub fn minutes_between(start: Timestamp, end: Timestamp) -> i64 {
    let measurement = measure_interval(start, end);
    debug_assert!(
        measurement.is_trusted(),
        "interval anomaly between {start} and {end}: {:?}",
        measurement.anomaly
    );
    measurement.minutes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(day: u32, h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, day, h, m, 0).unwrap()
    }

    #[test]
    fn test_same_instant_is_zero() {
        let a = at(10, 22, 30);
        assert_eq!(minutes_between(a, a), 0);
    }

    #[test]
    fn test_plain_forward_interval() {
        assert_eq!(minutes_between(at(10, 22, 30), at(11, 1, 20)), 170);
    }

    #[test]
    fn test_across_midnight_with_absolute_instants() {
        assert_eq!(minutes_between(at(10, 20, 53), at(11, 0, 51)), 238);
    }

    #[test]
    fn test_rollover_correction_for_same_day_stamp() {
        // 00:51 stored against the evening's date
        let m = measure_interval(at(10, 20, 53), at(10, 0, 51));
        assert_eq!(m.minutes, 238);
        assert!(m.rolled_over);
        assert!(m.is_trusted());
        assert_eq!(minutes_between(at(10, 20, 53), at(10, 0, 51)), 238);
    }

    #[test]
    fn test_directional() {
        let a = at(10, 22, 0);
        let b = at(10, 23, 0);
        assert_eq!(minutes_between(a, b), 60);
        // b -> a is -60 raw, rolled 1380 > 12h: anomaly
        let m = measure_interval(b, a);
        assert_eq!(m.minutes, -60);
        assert!(!m.is_trusted());
    }

    #[test]
    fn test_rollover_boundary_twelve_hours() {
        // raw = -720 → rolled = 720, the edge of the plausibility window
        let m = measure_interval(at(10, 12, 0), at(10, 0, 0));
        assert_eq!(m.minutes, 720);
        assert!(m.is_trusted());

        // raw = -719 → rolled = 721, just outside
        let m = measure_interval(at(10, 11, 59), at(10, 0, 0));
        assert_eq!(
            m.anomaly,
            Some(IntervalAnomaly::UnexplainedNegative { raw_minutes: -719 })
        );
    }

    #[test]
    fn test_more_than_a_day_negative_is_anomaly() {
        let m = measure_interval(at(12, 0, 0), at(10, 0, 0));
        assert_eq!(m.minutes, -2880);
        assert_eq!(m.anomaly.map(|a| a.category()), Some(ErrorCategory::Invariant));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "interval anomaly")]
    fn test_minutes_between_asserts_on_anomaly_in_debug() {
        let _ = minutes_between(at(10, 23, 0), at(10, 22, 0));
    }
}
