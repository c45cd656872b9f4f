//! Retry queue configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

fn default_max_retries() -> u8 {
    3
}

fn default_backoff_base_seconds() -> u64 {
    2
}

fn default_idle_poll_seconds() -> u64 {
    30
}

/// Retry queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryQueueConfig {
    /// Failed flush attempts after which a task is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,

    /// Backoff base; the delay after attempt `n` is `base^n` seconds.
    #[serde(default = "default_backoff_base_seconds")]
    pub backoff_base_seconds: u64,

    /// Background flush interval when nothing is waiting on backoff.
    #[serde(default = "default_idle_poll_seconds")]
    pub idle_poll_seconds: u64,
}

impl Default for RetryQueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_seconds: default_backoff_base_seconds(),
            idle_poll_seconds: default_idle_poll_seconds(),
        }
    }
}

impl RetryQueueConfig {
    /// Delay before the next attempt after `attempt_count` failures.
    pub fn backoff(&self, attempt_count: u8) -> Duration {
        let secs = self
            .backoff_base_seconds
            .saturating_pow(u32::from(attempt_count));
        Duration::from_secs(secs)
    }

    /// Idle poll interval.
    pub fn idle_poll(&self) -> Duration {
        Duration::from_secs(self.idle_poll_seconds)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_retries == 0 {
            return Err(ValidationError::OutOfRange {
                field: "max_retries".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.backoff_base_seconds == 0 {
            return Err(ValidationError::OutOfRange {
                field: "backoff_base_seconds".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.idle_poll_seconds == 0 {
            return Err(ValidationError::OutOfRange {
                field: "idle_poll_seconds".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
