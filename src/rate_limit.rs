//! Per-event-type cooldown gate for bursty event logging.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

fn default_cooldowns() -> HashMap<String, u64> {
    HashMap::from([
        ("bathroom".to_string(), 60),
        ("lights_out".to_string(), 60),
        ("wake_temp".to_string(), 60),
    ])
}

/// Cooldown table, in seconds per event type.
///
/// Event types missing from the table have no cooldown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Event type to cooldown seconds
    #[serde(default = "default_cooldowns")]
    pub cooldowns: HashMap<String, u64>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            cooldowns: default_cooldowns(),
        }
    }
}

impl RateLimiterConfig {
    /// Adds or replaces a cooldown.
    #[must_use]
    pub fn with_cooldown(mut self, event_type: impl Into<String>, seconds: u64) -> Self {
        self.cooldowns.insert(event_type.into(), seconds);
        self
    }

    /// Cooldown for `event_type`; zero when not configured.
    pub fn cooldown(&self, event_type: &str) -> Duration {
        Duration::from_secs(self.cooldowns.get(event_type).copied().unwrap_or(0))
    }
}

/// Tracks the last firing of each event type.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    last_fired: Mutex<HashMap<String, Timestamp>>,
}

impl RateLimiter {
    /// Creates a limiter with no recorded firings.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// Cooldown table.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Records a firing at `at` if the cooldown has passed.
    ///
    /// Returns false without recording anything when blocked.
    pub fn should_allow(&self, event_type: &str, at: Timestamp) -> bool {
        let mut last_fired = self.lock();
        if !self.is_clear(&last_fired, event_type, at) {
            tracing::debug!(event_type, "event rate limited");
            return false;
        }
        last_fired.insert(event_type.to_string(), at);
        true
    }

    /// Same check as [`should_allow`](Self::should_allow), without recording.
    pub fn can_log(&self, event_type: &str, at: Timestamp) -> bool {
        self.is_clear(&self.lock(), event_type, at)
    }

    /// Time left before `event_type` may fire again.
    pub fn remaining_cooldown(&self, event_type: &str, at: Timestamp) -> Duration {
        let cooldown = self.config.cooldown(event_type);
        match self.lock().get(event_type) {
            Some(&last) => {
                let elapsed = (at - last).to_std().unwrap_or_default();
                cooldown.saturating_sub(elapsed)
            }
            None => Duration::ZERO,
        }
    }

    /// Forgets the last firing of `event_type`.
    pub fn reset(&self, event_type: &str) {
        self.lock().remove(event_type);
    }

    /// Forgets every recorded firing.
    pub fn reset_all(&self) {
        self.lock().clear();
    }

    fn is_clear(&self, last_fired: &HashMap<String, Timestamp>, event_type: &str, at: Timestamp) -> bool {
        let cooldown = self.config.cooldown(event_type);
        if cooldown.is_zero() {
            return true;
        }
        match last_fired.get(event_type) {
            // An `at` earlier than the last firing counts as zero elapsed.
            Some(&last) => (at - last).to_std().unwrap_or_default() >= cooldown,
            None => true,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Timestamp>> {
        self.last_fired.lock().unwrap_or_else(|e| e.into_inner())
    }
}
