//! Session key bucketing.
//!
//! A night belongs to the evening it started on: instants from
//! `rollover_hour` on day D up to `rollover_hour` on day D+1 map to key D.

use chrono::{Duration, FixedOffset, NaiveDate, Timelike};

use crate::types::Timestamp;

/// Local calendar date of the night `now` belongs to.
pub fn session_date(now: Timestamp, timezone: &FixedOffset, rollover_hour: u32) -> NaiveDate {
    let local = now.with_timezone(timezone);
    let date = local.date_naive();
    if local.hour() < rollover_hour {
        date - Duration::days(1)
    } else {
        date
    }
}

/// Session key (`YYYY-MM-DD`) for the night `now` belongs to.
pub fn session_key(now: Timestamp, timezone: &FixedOffset, rollover_hour: u32) -> String {
    session_date(now, timezone, rollover_hour)
        .format("%Y-%m-%d")
        .to_string()
}
