//! Offline-tolerant delivery of remote actions.
//!
//! This module contains:
//! - `error`: transport failure classes
//! - `transport`: the [`Transport`] seam and a scripted mock
//! - `config`: retry limits and backoff
//!
//! [`RetryQueue::perform`] tries an action once. Transient failures are
//! queued and retried by [`RetryQueue::flush`] with exponential backoff;
//! permanent failures are returned to the caller. Delivery is
//! at-least-once, so actions must be safe to resend.

pub mod config;
pub mod error;
pub mod transport;

pub use config::RetryQueueConfig;
pub use error::TransportError;
pub use transport::{MockTransport, Transport, TransportResponse};

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::ActionError;
use crate::types::Timestamp;

// ============================================================================
// Queue records
// ============================================================================

/// An action waiting for redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask<A> {
    /// Queue-assigned id
    pub id: Uuid,
    /// The action to deliver
    pub action: A,
    /// Failed flush attempts so far
    pub attempt_count: u8,
    /// Skipped by flush until this instant
    pub next_eligible_at: Timestamp,
    /// When the task was queued
    pub enqueued_at: Timestamp,
}

/// Result of [`RetryQueue::perform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PerformOutcome {
    /// Delivered on the first attempt
    Delivered(TransportResponse),
    /// Accepted and queued for retry
    Queued {
        /// Id of the queued task
        task_id: Uuid,
    },
}

impl PerformOutcome {
    /// Returns true if the action is waiting in the queue.
    pub fn is_queued(&self) -> bool {
        matches!(self, PerformOutcome::Queued { .. })
    }
}

/// A task removed from the queue without being delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedTask<A> {
    /// Task id
    pub id: Uuid,
    /// The undelivered action
    pub action: A,
    /// Why it was dropped
    pub error: ActionError,
}

/// Summary of one [`RetryQueue::flush`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport<A> {
    /// Tasks delivered and removed
    pub delivered: usize,
    /// Tasks that failed and stay queued
    pub retried: usize,
    /// Tasks still in backoff
    pub skipped: usize,
    /// Tasks dropped as permanently failed
    pub dropped: Vec<DroppedTask<A>>,
    /// Another flush was in flight; nothing was done
    pub already_running: bool,
}

impl<A> Default for FlushReport<A> {
    fn default() -> Self {
        Self {
            delivered: 0,
            retried: 0,
            skipped: 0,
            dropped: Vec::new(),
            already_running: false,
        }
    }
}

// ============================================================================
// RetryQueue
// ============================================================================

/// FIFO retry queue with bounded exponential backoff.
pub struct RetryQueue<A> {
    config: RetryQueueConfig,
    clock: Arc<dyn Clock>,
    tasks: Mutex<VecDeque<QueuedTask<A>>>,
    flush_guard: Mutex<()>,
}

impl<A> RetryQueue<A>
where
    A: Clone + std::fmt::Debug,
{
    /// Creates an empty queue.
    pub fn new(config: RetryQueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            tasks: Mutex::new(VecDeque::new()),
            flush_guard: Mutex::new(()),
        }
    }

    /// Queue configuration.
    pub fn config(&self) -> &RetryQueueConfig {
        &self.config
    }

    /// Sends `action` once, queueing it on a transient failure.
    pub async fn perform<T>(&self, action: A, transport: &T) -> Result<PerformOutcome, ActionError>
    where
        T: Transport<A>,
    {
        match transport.send(&action).await {
            Ok(response) => {
                tracing::debug!(?action, status = response.status, "action delivered");
                Ok(PerformOutcome::Delivered(response))
            }
            Err(error) if error.is_transient() => {
                let task_id = self.enqueue(action).await;
                tracing::info!(%task_id, %error, "delivery failed; action queued for retry");
                Ok(PerformOutcome::Queued { task_id })
            }
            Err(error) => {
                tracing::warn!(?action, %error, "action rejected permanently");
                Err(ActionError::Permanent(error))
            }
        }
    }

    /// Appends `action` to the queue, eligible immediately.
    pub async fn enqueue(&self, action: A) -> Uuid {
        let now = self.clock.now();
        let task = QueuedTask {
            id: Uuid::new_v4(),
            action,
            attempt_count: 0,
            next_eligible_at: now,
            enqueued_at: now,
        };
        let id = task.id;
        self.tasks.lock().await.push_back(task);
        id
    }

    /// Retries every eligible task once, in FIFO order.
    ///
    /// A concurrent call returns immediately with `already_running` set.
    /// The pending list stays locked while the transport is awaited.
    pub async fn flush<T>(&self, transport: &T) -> FlushReport<A>
    where
        T: Transport<A>,
    {
        let Ok(_guard) = self.flush_guard.try_lock() else {
            tracing::debug!("flush already in flight; skipping");
            return FlushReport {
                already_running: true,
                ..FlushReport::default()
            };
        };

        let mut tasks = self.tasks.lock().await;
        let mut report = FlushReport::default();
        let mut index = 0;

        // Tasks stay in place until their send resolves, so a cancelled
        // flush leaves the queue intact.
        while index < tasks.len() {
            if tasks[index].next_eligible_at > self.clock.now() {
                report.skipped += 1;
                index += 1;
                continue;
            }

            let result = transport.send(&tasks[index].action).await;
            match result {
                Ok(_) => {
                    if let Some(task) = tasks.remove(index) {
                        tracing::debug!(task_id = %task.id, "queued action delivered");
                    }
                    report.delivered += 1;
                }
                Err(error) if error.is_transient() => {
                    let attempts = tasks[index].attempt_count.saturating_add(1);
                    if attempts >= self.config.max_retries {
                        if let Some(task) = tasks.remove(index) {
                            tracing::error!(
                                task_id = %task.id,
                                attempts,
                                %error,
                                "retries exhausted; dropping action"
                            );
                            report.dropped.push(DroppedTask {
                                id: task.id,
                                action: task.action,
                                error: ActionError::RetriesExhausted {
                                    attempts,
                                    last_error: error,
                                },
                            });
                        }
                    } else {
                        let next_eligible_at = self.next_eligible(attempts);
                        let task = &mut tasks[index];
                        task.attempt_count = attempts;
                        task.next_eligible_at = next_eligible_at;
                        tracing::debug!(
                            task_id = %task.id,
                            attempts,
                            %next_eligible_at,
                            "retry failed; backing off"
                        );
                        report.retried += 1;
                        index += 1;
                    }
                }
                Err(error) => {
                    if let Some(task) = tasks.remove(index) {
                        tracing::error!(task_id = %task.id, %error, "queued action rejected permanently");
                        report.dropped.push(DroppedTask {
                            id: task.id,
                            action: task.action,
                            error: ActionError::Permanent(error),
                        });
                    }
                }
            }
        }

        report
    }

    /// Number of queued tasks, for an offline indicator.
    pub async fn pending_count(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Copy of the queued tasks in FIFO order.
    pub async fn snapshot(&self) -> Vec<QueuedTask<A>> {
        self.tasks.lock().await.iter().cloned().collect()
    }

    /// Flushes in a loop until `shutdown` turns true or its sender is dropped.
    ///
    /// Sleeps until the earliest backoff deadline, or the idle poll interval
    /// when nothing is backing off. Shutdown interrupts the sleep; a flush
    /// already awaiting the transport finishes before the loop exits.
    pub async fn run_until_shutdown<T>(
        &self,
        transport: &T,
        mut shutdown: watch::Receiver<bool>,
        mut on_dropped: impl FnMut(DroppedTask<A>),
    ) where
        T: Transport<A>,
    {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.flush(transport).await;
            report.dropped.into_iter().for_each(&mut on_dropped);

            let wait = self.next_wake().await;
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("retry loop stopped");
    }

    async fn next_wake(&self) -> std::time::Duration {
        let idle = self.config.idle_poll();
        let now = self.clock.now();
        self.tasks
            .lock()
            .await
            .iter()
            .map(|task| (task.next_eligible_at - now).to_std().unwrap_or_default())
            .min()
            .map_or(idle, |wait| wait.min(idle))
    }

    fn next_eligible(&self, attempt_count: u8) -> Timestamp {
        let now = self.clock.now();
        chrono::Duration::from_std(self.config.backoff(attempt_count))
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

// ============================================================================
// Tests
// ============================================================================
