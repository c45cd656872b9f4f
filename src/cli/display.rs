//! Display utilities for the dosetap CLI.
//!
//! This module provides formatted output for:
//! - Dosing window context
//! - Interval measurements
//! - Session keys and configuration

use std::path::Path;

use crate::interval::{IntervalAnomaly, IntervalMeasurement};
use crate::types::{DosePhase, DoseWindowContext, Timestamp};

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows the dosing window context.
    pub fn show_phase(context: &DoseWindowContext) {
        println!("Dosing window");
        println!("─────────────────────────────");
        println!("Phase: {}", Self::phase_label(context.phase));

        if context.phase != DosePhase::NoDose1 {
            println!("Elapsed: {}", Self::format_minutes(context.elapsed_minutes));
        }
        if let Some(remaining) = context.remaining_minutes {
            println!("Remaining: {}", Self::format_minutes(remaining));
        }
        if let Some(target) = context.target_at {
            println!("Reminder target: {}", Self::format_timestamp(target));
        }
        println!("Snoozes: {}", context.snooze_count);
        println!("Snooze allowed: {}", Self::yes_no(context.snooze_allowed));
        println!("Skip allowed: {}", Self::yes_no(context.skip_allowed));
        if context.late_override_required {
            println!("Dose 2 now requires a confirmed late override");
        }
        if context.interval_anomaly {
            println!("Warning: dose 1 time is inconsistent with now; elapsed time is unreliable");
        }
    }

    /// Shows an interval measurement.
    pub fn show_interval(measurement: &IntervalMeasurement) {
        match measurement.anomaly {
            None => {
                println!("{} minutes", measurement.minutes);
                if measurement.rolled_over {
                    println!("(corrected for midnight rollover)");
                }
            }
            Some(IntervalAnomaly::UnexplainedNegative { raw_minutes }) => {
                println!("Interval anomaly: raw difference is {raw_minutes} minutes");
                println!("The end time cannot be explained by a single midnight rollover");
            }
        }
    }

    /// Shows the session key for an instant.
    pub fn show_session_key(key: &str) {
        println!("{key}");
    }

    /// Shows the effective configuration as TOML.
    pub fn show_config(path: &Path, exists: bool, toml: &str) {
        if exists {
            println!("# {}", path.display());
        } else {
            println!("# {} (not found, showing defaults)", path.display());
        }
        print!("{toml}");
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("Error: {message}");
    }

    /// Human-readable phase label.
    pub fn phase_label(phase: DosePhase) -> &'static str {
        match phase {
            DosePhase::NoDose1 => "waiting for dose 1",
            DosePhase::BeforeWindow => "before window",
            DosePhase::Active => "window open",
            DosePhase::NearClose => "window closing soon",
            DosePhase::Closed => "window closed",
            DosePhase::Finalizing => "finalizing",
            DosePhase::Completed => "completed",
        }
    }

    /// Formats minutes as `Hh MMm`.
    fn format_minutes(total: i64) -> String {
        let sign = if total < 0 { "-" } else { "" };
        let total = total.abs();
        format!("{sign}{}h {:02}m", total / 60, total % 60)
    }

    fn format_timestamp(at: Timestamp) -> String {
        at.format("%Y-%m-%d %H:%M UTC").to_string()
    }

    fn yes_no(value: bool) -> &'static str {
        if value {
            "yes"
        } else {
            "no"
        }
    }
}
