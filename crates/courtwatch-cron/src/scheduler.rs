// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic scrape scheduling.
//!
//! The scheduler holds no state of its own: `last_enqueued_at`, the
//! outstanding-task marker and the pause flag all live in the store, so
//! any number of schedulers can tick against one database.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use courtwatch_core::{Clock, CourtwatchError, TaskId, VenueId};
use courtwatch_queue::TaskQueue;
use courtwatch_storage::queries::{controls, schedule};
use courtwatch_storage::{Database, QueueDepth, ScheduleOutcome};
use serde::Serialize;
use tracing::{debug, info, warn};

/// What one scheduler pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Enqueueing is paused; nothing was examined.
    pub paused: bool,
    pub enqueued: Vec<(VenueId, TaskId)>,
    pub not_due: usize,
    /// Skipped because a task for the venue is still queued or in flight.
    pub outstanding: usize,
    pub inactive: usize,
    /// Venues whose enqueue failed; retried on the next tick.
    pub errors: Vec<(VenueId, String)>,
}

/// Per-venue scheduling view for the status command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueStatus {
    pub venue_id: VenueId,
    pub name: String,
    pub active: bool,
    pub interval_minutes: u32,
    pub last_enqueued_at: Option<DateTime<Utc>>,
    pub last_completed_at: Option<DateTime<Utc>>,
    /// `None` for inactive venues; `now` when never scheduled.
    pub next_due_at: Option<DateTime<Utc>>,
    pub outstanding_task_id: Option<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub paused: bool,
    pub generated_at: DateTime<Utc>,
    pub venues: Vec<VenueStatus>,
    pub queue: QueueDepth,
}

impl SchedulerStatus {
    pub fn dead_letters(&self) -> u64 {
        self.queue.dead_letter
    }
}

pub struct Scheduler {
    db: Database,
    queue: TaskQueue,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(db: Database, queue: TaskQueue, clock: Arc<dyn Clock>) -> Self {
        Self { db, queue, clock }
    }

    /// One scheduling pass over every venue.
    ///
    /// A failure for one venue is logged and recorded in the report; the
    /// pass continues with the rest. Only a failure to read the venue list
    /// or the pause flag fails the tick.
    pub async fn tick(&self) -> Result<TickReport, CourtwatchError> {
        let mut report = TickReport::default();
        if controls::is_paused(&self.db).await? {
            debug!("scheduler paused, skipping tick");
            report.paused = true;
            return Ok(report);
        }

        let venues = schedule::list_schedule(&self.db).await?;
        for state in venues {
            let venue_id = state.venue.id;
            if !state.venue.active {
                report.inactive += 1;
                continue;
            }
            match self.queue.enqueue_if_due(&venue_id).await {
                Ok(ScheduleOutcome::Enqueued(task)) => {
                    info!(venue_id = %venue_id, task_id = %task.id, "scrape scheduled");
                    report.enqueued.push((venue_id, task.id));
                }
                Ok(ScheduleOutcome::NotDue { .. }) => report.not_due += 1,
                Ok(ScheduleOutcome::Outstanding { task_id }) => {
                    debug!(venue_id = %venue_id, task_id = %task_id, "previous scrape outstanding");
                    report.outstanding += 1;
                }
                Ok(ScheduleOutcome::Inactive) => report.inactive += 1,
                Err(e) => {
                    warn!(venue_id = %venue_id, error = %e, "enqueue failed, retrying next tick");
                    report.errors.push((venue_id, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Stop enqueueing on every scheduler sharing this store. In-flight
    /// and queued tasks are unaffected.
    pub async fn pause(&self) -> Result<(), CourtwatchError> {
        controls::set_paused(&self.db, true, self.clock.now()).await?;
        info!("scheduler paused");
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), CourtwatchError> {
        controls::set_paused(&self.db, false, self.clock.now()).await?;
        info!("scheduler resumed");
        Ok(())
    }

    pub async fn is_paused(&self) -> Result<bool, CourtwatchError> {
        controls::is_paused(&self.db).await
    }

    /// Last and next run per venue plus queue depth and dead-letter count.
    pub async fn status(&self) -> Result<SchedulerStatus, CourtwatchError> {
        let now = self.clock.now();
        let venues = schedule::list_schedule(&self.db)
            .await?
            .into_iter()
            .map(|state| {
                let next_due_at = if state.venue.active {
                    Some(state.next_due_at().map_or(now, |due| due.max(now)))
                } else {
                    None
                };
                VenueStatus {
                    venue_id: state.venue.id.clone(),
                    name: state.venue.name.clone(),
                    active: state.venue.active,
                    interval_minutes: state.venue.interval_minutes,
                    last_enqueued_at: state.last_enqueued_at,
                    last_completed_at: state.last_completed_at,
                    next_due_at,
                    outstanding_task_id: state.outstanding_task_id,
                }
            })
            .collect();

        Ok(SchedulerStatus {
            paused: self.is_paused().await?,
            generated_at: now,
            venues,
            queue: self.queue.depth().await?,
        })
    }
}
