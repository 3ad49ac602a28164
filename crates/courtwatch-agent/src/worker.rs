// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scrape workers.
//!
//! A worker leases one task at a time, scrapes the venue, feeds the result
//! through change detection and alert dispatch, then acks. Scrape failures
//! are nacked with a reason derived from the error class so the queue can
//! decide between backoff and dead-lettering.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use courtwatch_alerts::{AlertDispatcher, ChangeDetector};
use courtwatch_config::model::WorkerConfig;
use courtwatch_core::{
    Clock, CourtwatchError, LeasedTask, ScrapeError, Scraper, Slot, TaskId, VenueId,
};
use courtwatch_queue::{NackReason, TaskQueue};
use courtwatch_storage::queries::{scrape_logs, venues};
use courtwatch_storage::{Database, FailOutcome, ScrapeLogEntry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause after a failed dequeue before trying again.
const DEQUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// What [`Worker::process_one`] did with the task it leased.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkOutcome {
    /// Nothing was ready.
    Idle,
    Completed {
        task_id: TaskId,
        venue_id: VenueId,
        slots: usize,
        events: usize,
        alerts_sent: usize,
        /// A newer snapshot was already stored; the result was discarded.
        stale: bool,
    },
    /// The venue was deactivated after the task was queued; acked unscraped.
    Skipped { task_id: TaskId, venue_id: VenueId },
    Failed {
        task_id: TaskId,
        venue_id: VenueId,
        error: String,
        outcome: FailOutcome,
    },
    /// The lease expired mid-processing and the task went to someone else.
    LeaseLost { task_id: TaskId, venue_id: VenueId },
}

pub struct Worker {
    id: String,
    queue: TaskQueue,
    db: Database,
    clock: Arc<dyn Clock>,
    scraper: Arc<dyn Scraper>,
    detector: ChangeDetector,
    dispatcher: Arc<AlertDispatcher>,
    scrape_timeout: Duration,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        queue: TaskQueue,
        scraper: Arc<dyn Scraper>,
        dispatcher: Arc<AlertDispatcher>,
        config: &WorkerConfig,
    ) -> Self {
        let db = queue.database().clone();
        let clock = queue.clock().clone();
        Self {
            id: id.into(),
            detector: ChangeDetector::new(db.clone()),
            queue,
            db,
            clock,
            scraper,
            dispatcher,
            scrape_timeout: Duration::from_secs(config.scrape_timeout_secs),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lease and fully process at most one ready task, without waiting.
    pub async fn process_one(&self) -> Result<WorkOutcome, CourtwatchError> {
        match self.queue.try_dequeue(&self.id).await? {
            Some(leased) => self.handle(leased).await,
            None => Ok(WorkOutcome::Idle),
        }
    }

    /// Process tasks until `cancel` fires.
    ///
    /// Cancellation is only observed between tasks; a task already leased
    /// is processed to completion so its lease is settled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(worker_id = %self.id, scraper = self.scraper.name(), "worker started");
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = self.queue.dequeue(&self.id) => next,
            };
            match next {
                Ok(Some(leased)) => {
                    if let Err(e) = self.handle(leased).await {
                        error!(worker_id = %self.id, error = %e, "task processing failed");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(worker_id = %self.id, error = %e, "dequeue failed (non-fatal)");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(DEQUEUE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }
        info!(worker_id = %self.id, "worker stopped");
    }

    async fn handle(&self, leased: LeasedTask) -> Result<WorkOutcome, CourtwatchError> {
        let task_id = leased.task.id.clone();
        let venue_id = leased.task.venue_id.clone();
        let attempt = leased.task.attempts + 1;
        debug!(worker_id = %self.id, task_id = %task_id, venue_id = %venue_id, attempt, "task leased");

        let venue = match venues::get_venue(&self.db, &venue_id).await? {
            Some(venue) if venue.active => venue,
            Some(_) => {
                info!(venue_id = %venue_id, task_id = %task_id, "venue inactive, dropping task");
                if !self.queue.ack(&leased).await? {
                    return Ok(WorkOutcome::LeaseLost { task_id, venue_id });
                }
                return Ok(WorkOutcome::Skipped { task_id, venue_id });
            }
            None => {
                let reason = NackReason::Terminal(format!("unknown venue '{venue_id}'"));
                return self.fail(&leased, reason).await;
            }
        };

        let started_at = self.clock.now();
        let scraped = match tokio::time::timeout(self.scrape_timeout, self.scraper.scrape(&venue)).await
        {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::Transient(format!(
                "scrape timed out after {}s",
                self.scrape_timeout.as_secs()
            ))),
        };
        self.log_scrape(&leased, attempt, started_at, &scraped).await;

        let slots = match scraped {
            Ok(slots) => slots,
            Err(e) => return self.fail(&leased, NackReason::from(&e)).await,
        };
        let slot_count = slots.len();

        let detection = match self.detector.apply(&venue_id, slots, started_at).await {
            Ok(detection) => detection,
            Err(e) => {
                // Nothing was committed; the retry will diff against the same snapshot.
                let reason = NackReason::Retryable(format!("snapshot update failed: {e}"));
                return self.fail(&leased, reason).await;
            }
        };

        // The snapshot is committed from here on. A retry would see no
        // changes, so dispatch problems are logged rather than nacked.
        let alerts_sent = match self.dispatcher.dispatch(&detection.events).await {
            Ok(report) => {
                if report.failed() > 0 {
                    warn!(venue_id = %venue_id, failed = report.failed(), "some alerts failed");
                }
                report.sent()
            }
            Err(e) => {
                error!(venue_id = %venue_id, error = %e, "alert dispatch failed");
                0
            }
        };

        if !self.queue.ack(&leased).await? {
            return Ok(WorkOutcome::LeaseLost { task_id, venue_id });
        }
        info!(
            venue_id = %venue_id,
            task_id = %task_id,
            slots = slot_count,
            events = detection.events.len(),
            alerts_sent,
            "scrape completed"
        );
        Ok(WorkOutcome::Completed {
            task_id,
            venue_id,
            slots: slot_count,
            events: detection.events.len(),
            alerts_sent,
            stale: detection.stale,
        })
    }

    async fn fail(
        &self,
        leased: &LeasedTask,
        reason: NackReason,
    ) -> Result<WorkOutcome, CourtwatchError> {
        let outcome = self.queue.nack(leased, &reason).await?;
        let task_id = leased.task.id.clone();
        let venue_id = leased.task.venue_id.clone();
        if outcome == FailOutcome::LeaseLost {
            return Ok(WorkOutcome::LeaseLost { task_id, venue_id });
        }
        Ok(WorkOutcome::Failed {
            task_id,
            venue_id,
            error: reason.message().to_string(),
            outcome,
        })
    }

    async fn log_scrape(
        &self,
        leased: &LeasedTask,
        attempt: u32,
        started_at: DateTime<Utc>,
        result: &Result<Vec<Slot>, ScrapeError>,
    ) {
        let entry = ScrapeLogEntry {
            venue_id: leased.task.venue_id.clone(),
            task_id: leased.task.id.clone(),
            attempt,
            started_at,
            finished_at: self.clock.now(),
            success: result.is_ok(),
            slot_count: result
                .as_ref()
                .map_or(0, |slots| u32::try_from(slots.len()).unwrap_or(u32::MAX)),
            error: result.as_ref().err().map(ToString::to_string),
        };
        if let Err(e) = scrape_logs::insert_log(&self.db, &entry).await {
            warn!(task_id = %entry.task_id, error = %e, "failed to write scrape log (non-fatal)");
        }
    }
}
