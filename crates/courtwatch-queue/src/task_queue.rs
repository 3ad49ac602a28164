// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The scrape task queue.
//!
//! A thin policy layer over the `scrape_tasks` table: leases carry a
//! visibility timeout, failures are requeued with jittered backoff, and
//! tasks that exhaust their attempts land in the dead-letter lane. Any
//! number of [`TaskQueue`] handles (in one process or many) may share one
//! database; every transition is a single store transaction.

use std::sync::Arc;
use std::time::Duration;

use courtwatch_config::model::QueueConfig;
use courtwatch_core::{
    checked_after, Clock, CourtwatchError, LeasedTask, ScrapeError, Task, TaskId, VenueId,
};
use courtwatch_storage::queries::{queue, schedule};
use courtwatch_storage::{
    Database, FailOutcome, QueueDepth, ReclaimOutcome, RequeueOutcome, ScheduleOutcome,
};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;

/// Why a worker gave a task back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackReason {
    /// Worth another attempt after backoff.
    Retryable(String),
    /// Retrying cannot help; dead-letter now.
    Terminal(String),
}

impl NackReason {
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(m) | Self::Terminal(m) => m,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

impl From<&ScrapeError> for NackReason {
    fn from(err: &ScrapeError) -> Self {
        if err.is_retryable() {
            Self::Retryable(err.to_string())
        } else {
            Self::Terminal(err.to_string())
        }
    }
}

/// Durable at-least-once task queue backed by SQLite.
#[derive(Clone)]
pub struct TaskQueue {
    db: Database,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    visibility_timeout: Duration,
    max_attempts: u32,
    dequeue_timeout: Duration,
    poll_interval: Duration,
    /// Wakes blocked `dequeue` callers in this process when work arrives.
    notify: Arc<Notify>,
}

impl TaskQueue {
    pub fn new(db: Database, config: &QueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            policy: RetryPolicy::from_config(config),
            visibility_timeout: Duration::from_secs(config.visibility_timeout_secs),
            max_attempts: config.max_attempts.max(1),
            dequeue_timeout: Duration::from_secs(config.dequeue_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Replace the retry policy (tests use a jitter-free one).
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn visibility_timeout(&self) -> Duration {
        self.visibility_timeout
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Unconditionally enqueue a task for `venue_id`.
    ///
    /// Bypasses the single-flight check; the scheduler uses
    /// [`enqueue_if_due`](Self::enqueue_if_due) instead.
    pub async fn enqueue(&self, venue_id: &VenueId) -> Result<Task, CourtwatchError> {
        let task = queue::insert_task(&self.db, venue_id, self.max_attempts, self.clock.now())
            .await
            .map_err(CourtwatchError::into_queue_unavailable)?;
        debug!(task_id = %task.id, venue_id = %venue_id, "task enqueued");
        self.notify.notify_waiters();
        Ok(task)
    }

    /// Enqueue a task for `venue_id` if the venue is active, due, and has no
    /// outstanding task, all decided in one store transaction.
    pub async fn enqueue_if_due(
        &self,
        venue_id: &VenueId,
    ) -> Result<ScheduleOutcome, CourtwatchError> {
        let outcome =
            schedule::try_schedule(&self.db, venue_id, self.max_attempts, self.clock.now())
                .await
                .map_err(CourtwatchError::into_queue_unavailable)?;
        if let ScheduleOutcome::Enqueued(task) = &outcome {
            debug!(task_id = %task.id, venue_id = %venue_id, "scheduled scrape enqueued");
            self.notify.notify_waiters();
        }
        Ok(outcome)
    }

    /// Lease the next visible task without waiting.
    ///
    /// Expired leases are reclaimed first so a crashed worker's task becomes
    /// deliverable again as soon as its lease runs out.
    pub async fn try_dequeue(&self, worker_id: &str) -> Result<Option<LeasedTask>, CourtwatchError> {
        self.reclaim_expired().await?;
        let now = self.clock.now();
        let lease_until =
            checked_after(now, self.visibility_timeout, "queue.visibility_timeout_secs")?;
        let leased = queue::lease_next(&self.db, worker_id, now, lease_until)
            .await
            .map_err(CourtwatchError::into_queue_unavailable)?;
        if let Some(leased) = &leased {
            debug!(
                task_id = %leased.task.id,
                venue_id = %leased.task.venue_id,
                worker_id,
                attempt = leased.task.attempts + 1,
                "task leased"
            );
        }
        Ok(leased)
    }

    /// Lease the next visible task, waiting up to the configured dequeue timeout.
    pub async fn dequeue(&self, worker_id: &str) -> Result<Option<LeasedTask>, CourtwatchError> {
        self.dequeue_timeout(worker_id, self.dequeue_timeout).await
    }

    /// Lease the next visible task, waiting up to `timeout`.
    ///
    /// Wakes early when a task is enqueued through any handle sharing this
    /// queue; otherwise re-polls the store every poll interval so tasks
    /// enqueued by other processes and expiring backoffs are picked up.
    pub async fn dequeue_timeout(
        &self,
        worker_id: &str,
        timeout: Duration,
    ) -> Result<Option<LeasedTask>, CourtwatchError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before polling so an enqueue racing with
            // the poll is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(leased) = self.try_dequeue(worker_id).await? {
                return Ok(Some(leased));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wait = self.poll_interval.min(deadline - now);
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Acknowledge successful processing. The task is removed and the
    /// venue's outstanding marker cleared.
    ///
    /// Returns `false` if the lease was lost (expired and reclaimed, or
    /// re-leased by another worker); the work is then redone elsewhere,
    /// which the snapshot-overwrite design tolerates.
    pub async fn ack(&self, leased: &LeasedTask) -> Result<bool, CourtwatchError> {
        let acked = queue::ack(&self.db, &leased.task.id, &leased.worker_id, self.clock.now())
            .await
            .map_err(CourtwatchError::into_queue_unavailable)?;
        if acked {
            debug!(task_id = %leased.task.id, venue_id = %leased.task.venue_id, "task acknowledged");
        } else {
            warn!(
                task_id = %leased.task.id,
                venue_id = %leased.task.venue_id,
                worker_id = %leased.worker_id,
                "ack after lease was lost"
            );
        }
        Ok(acked)
    }

    /// Give a leased task back after a failed attempt.
    pub async fn nack(
        &self,
        leased: &LeasedTask,
        reason: &NackReason,
    ) -> Result<FailOutcome, CourtwatchError> {
        let policy = self.policy;
        let outcome = queue::fail(
            &self.db,
            &leased.task.id,
            &leased.worker_id,
            reason.message(),
            reason.is_terminal(),
            self.clock.now(),
            move |attempts| policy.chrono_delay(attempts),
        )
        .await
        .map_err(CourtwatchError::into_queue_unavailable)?;

        match &outcome {
            FailOutcome::Retrying {
                attempts,
                available_at,
            } => info!(
                task_id = %leased.task.id,
                venue_id = %leased.task.venue_id,
                attempts,
                retry_at = %available_at,
                reason = reason.message(),
                "task failed, retrying after backoff"
            ),
            FailOutcome::DeadLettered { attempts } => warn!(
                task_id = %leased.task.id,
                venue_id = %leased.task.venue_id,
                attempts,
                reason = reason.message(),
                "task moved to dead-letter lane"
            ),
            FailOutcome::LeaseLost => warn!(
                task_id = %leased.task.id,
                worker_id = %leased.worker_id,
                "nack after lease was lost"
            ),
        }
        Ok(outcome)
    }

    /// Return tasks whose lease expired to the retry path. Lease expiry
    /// counts as a failed attempt.
    pub async fn reclaim_expired(&self) -> Result<ReclaimOutcome, CourtwatchError> {
        let policy = self.policy;
        let outcome = queue::reclaim_expired(&self.db, self.clock.now(), move |attempts| {
            policy.chrono_delay(attempts)
        })
        .await
        .map_err(CourtwatchError::into_queue_unavailable)?;

        if !outcome.requeued.is_empty() {
            info!(count = outcome.requeued.len(), "reclaimed expired leases");
        }
        for task_id in &outcome.dead_lettered {
            warn!(task_id = %task_id, "expired lease exhausted attempts, task dead-lettered");
        }
        Ok(outcome)
    }

    /// Dead-lettered tasks, oldest first.
    pub async fn dead_letters(&self) -> Result<Vec<Task>, CourtwatchError> {
        queue::list_dead_letters(&self.db)
            .await
            .map_err(CourtwatchError::into_queue_unavailable)
    }

    /// Move a dead-lettered task back to the queue with a fresh attempt budget.
    pub async fn requeue_dead_letter(
        &self,
        task_id: &TaskId,
    ) -> Result<RequeueOutcome, CourtwatchError> {
        let outcome = queue::requeue_dead_letter(&self.db, task_id, self.clock.now())
            .await
            .map_err(CourtwatchError::into_queue_unavailable)?;
        match &outcome {
            RequeueOutcome::Requeued => {
                info!(task_id = %task_id, "dead-lettered task requeued");
                self.notify.notify_waiters();
            }
            RequeueOutcome::NotFound => {
                debug!(task_id = %task_id, "no dead-lettered task to requeue");
            }
            RequeueOutcome::VenueBusy { task_id: busy } => {
                info!(task_id = %task_id, outstanding = %busy, "venue busy, requeue refused");
            }
        }
        Ok(outcome)
    }

    pub async fn depth(&self) -> Result<QueueDepth, CourtwatchError> {
        queue::depth(&self.db, self.clock.now())
            .await
            .map_err(CourtwatchError::into_queue_unavailable)
    }
}
