//! Command definitions for the dosetap CLI.
//!
//! Uses clap derive macro for argument parsing.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};

use crate::types::Timestamp;

// ============================================================================
// CLI Structure
// ============================================================================

/// dosetap - dose-timing engine inspector
#[derive(Parser, Debug)]
#[command(
    name = "dosetap",
    version,
    about = "Inspect dosing window phases, intervals and session keys",
    long_about = "Runs the dose-timing engine from the terminal.\n\
                  Timestamps are RFC 3339 (e.g. 2026-03-10T22:30:00Z).",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show the dosing phase for a night
    Phase(PhaseArgs),

    /// Measure the interval between two times, correcting one midnight rollover
    Interval {
        /// Start time (RFC 3339 or HH:MM)
        #[arg(value_parser = parse_time_or_timestamp)]
        start: Timestamp,

        /// End time (RFC 3339 or HH:MM)
        #[arg(value_parser = parse_time_or_timestamp)]
        end: Timestamp,
    },

    /// Show the session key an instant belongs to
    SessionKey {
        /// Instant to bucket (defaults to now)
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<Timestamp>,

        /// Host timezone offset in minutes (overrides the config file)
        #[arg(long, allow_hyphen_values = true)]
        utc_offset: Option<i32>,
    },

    /// Show the effective configuration
    Config {
        /// Print the config file path only
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ============================================================================
// Phase Command Arguments
// ============================================================================

/// Arguments for the phase command
#[derive(Args, Debug, Clone, Default)]
pub struct PhaseArgs {
    /// Dose 1 time
    #[arg(long, value_parser = parse_timestamp)]
    pub dose1: Option<Timestamp>,

    /// Dose 2 time
    #[arg(long, value_parser = parse_timestamp)]
    pub dose2: Option<Timestamp>,

    /// Dose 2 was skipped
    #[arg(long, conflicts_with = "dose2")]
    pub skipped: bool,

    /// Snoozes already applied
    #[arg(long, default_value = "0")]
    pub snoozes: u8,

    /// Final wake time
    #[arg(long, value_parser = parse_timestamp)]
    pub wake_final: Option<Timestamp>,

    /// Evaluate at this instant instead of now
    #[arg(long, value_parser = parse_timestamp)]
    pub now: Option<Timestamp>,

    /// Print the context as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Value Parsers
// ============================================================================

/// Parses an RFC 3339 timestamp into UTC.
fn parse_timestamp(s: &str) -> Result<Timestamp, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{s}': {e} (expected RFC 3339)"))
}

/// Parses RFC 3339, or a bare `HH:MM` anchored to 1970-01-01 UTC.
fn parse_time_or_timestamp(s: &str) -> Result<Timestamp, String> {
    if let Ok(time) = NaiveTime::parse_from_str(s, "%H:%M") {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).ok_or("invalid anchor date")?;
        return Ok(Utc.from_utc_datetime(&epoch.and_time(time)));
    }
    parse_timestamp(s)
}

// ============================================================================
// Tests
// ============================================================================
