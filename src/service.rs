//! Composition root for side-effecting actions.
//!
//! [`ActionService`] gates loggable events through the [`RateLimiter`],
//! then hands the action to the [`RetryQueue`] for immediate delivery with
//! offline fallback.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::ActionError;
use crate::queue::{
    DroppedTask, FlushReport, PerformOutcome, RetryQueue, RetryQueueConfig, Transport,
    TransportResponse,
};
use crate::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::types::DoseAction;

/// An action the service can deliver.
pub trait RemoteAction: Clone + Debug {
    /// Rate limiting key; `None` means the action is never rate limited.
    fn rate_limit_key(&self) -> Option<&str>;
}

impl RemoteAction for DoseAction {
    fn rate_limit_key(&self) -> Option<&str> {
        match self {
            DoseAction::LogEvent { event_type, .. } => Some(event_type.as_str()),
            DoseAction::TakeDose { .. } | DoseAction::SkipDose { .. } => None,
        }
    }
}

/// Result of [`ActionService::perform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Delivered immediately
    Delivered(TransportResponse),
    /// Saved offline; will be retried
    Queued {
        /// Queued task id
        task_id: Uuid,
    },
    /// Blocked by the cooldown; nothing was sent
    RateLimited {
        /// Time until the event type may fire again
        retry_after: Duration,
    },
}

impl From<PerformOutcome> for ActionOutcome {
    fn from(outcome: PerformOutcome) -> Self {
        match outcome {
            PerformOutcome::Delivered(response) => ActionOutcome::Delivered(response),
            PerformOutcome::Queued { task_id } => ActionOutcome::Queued { task_id },
        }
    }
}

/// Rate limited, offline-tolerant action delivery.
pub struct ActionService<A, T> {
    queue: RetryQueue<A>,
    limiter: RateLimiter,
    transport: T,
    clock: Arc<dyn Clock>,
}

impl<A, T> ActionService<A, T>
where
    A: RemoteAction,
    T: Transport<A>,
{
    /// Creates a service with a fresh queue and limiter.
    pub fn new(
        queue_config: RetryQueueConfig,
        limiter_config: RateLimiterConfig,
        transport: T,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue: RetryQueue::new(queue_config, clock.clone()),
            limiter: RateLimiter::new(limiter_config),
            transport,
            clock,
        }
    }

    /// Delivers `action`, queueing it on a transient failure.
    pub async fn perform(&self, action: A) -> Result<ActionOutcome, ActionError> {
        if let Some(key) = action.rate_limit_key() {
            let now = self.clock.now();
            if !self.limiter.should_allow(key, now) {
                let retry_after = self.limiter.remaining_cooldown(key, now);
                tracing::info!(event_type = key, ?retry_after, "event rejected by cooldown");
                return Ok(ActionOutcome::RateLimited { retry_after });
            }
        }

        self.queue
            .perform(action, &self.transport)
            .await
            .map(ActionOutcome::from)
    }

    /// Retries queued actions; call on reconnect or app foreground.
    pub async fn flush_pending(&self) -> FlushReport<A> {
        let report = self.queue.flush(&self.transport).await;
        if report.delivered > 0 || !report.dropped.is_empty() {
            tracing::info!(
                delivered = report.delivered,
                dropped = report.dropped.len(),
                "pending actions flushed"
            );
        }
        report
    }

    /// Runs the background flush loop until shutdown.
    pub async fn run_until_shutdown(
        &self,
        shutdown: watch::Receiver<bool>,
        on_dropped: impl FnMut(DroppedTask<A>),
    ) {
        self.queue
            .run_until_shutdown(&self.transport, shutdown, on_dropped)
            .await;
    }

    /// Number of actions waiting for redelivery.
    pub async fn pending_count(&self) -> usize {
        self.queue.pending_count().await
    }

    /// Underlying retry queue.
    pub fn queue(&self) -> &RetryQueue<A> {
        &self.queue
    }

    /// Underlying rate limiter.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}
