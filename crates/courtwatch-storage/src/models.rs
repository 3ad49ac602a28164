// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage-level record and outcome types.
//!
//! Domain entities live in `courtwatch-core::types`; this module holds the
//! shapes that only make sense at the persistence boundary.

use chrono::{DateTime, Utc};
use courtwatch_core::{Slot, Snapshot, Task, TaskId, Venue, VenueId};
use serde::{Deserialize, Serialize};

/// Result of an atomic "enqueue if due and idle" attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    Enqueued(Task),
    /// Not yet due; the venue becomes due at `next_due_at`.
    NotDue { next_due_at: DateTime<Utc> },
    /// A task for this venue is still queued or in flight.
    Outstanding { task_id: TaskId },
    /// Unknown or deactivated venue.
    Inactive,
}

/// Persisted scheduler view of one venue.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueScheduleState {
    pub venue: Venue,
    pub last_enqueued_at: Option<DateTime<Utc>>,
    pub outstanding_task_id: Option<TaskId>,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl VenueScheduleState {
    /// When the venue is next eligible for a scrape. `None` means "now".
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        self.last_enqueued_at.map(|at| at + self.venue.interval())
    }
}

/// Result of reporting a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    /// Back in the queue, invisible until `available_at`.
    Retrying {
        attempts: u32,
        available_at: DateTime<Utc>,
    },
    DeadLettered { attempts: u32 },
    /// The caller no longer holds the lease; nothing changed.
    LeaseLost,
}

/// Tasks recovered from expired leases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReclaimOutcome {
    pub requeued: Vec<TaskId>,
    pub dead_lettered: Vec<TaskId>,
}

/// Result of an operator requeue of a dead-lettered task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequeueOutcome {
    Requeued,
    NotFound,
    /// Another task for the venue is outstanding; requeueing would break single-flight.
    VenueBusy { task_id: TaskId },
}

/// Task counts per lane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    /// Pending and visible now.
    pub ready: u64,
    /// Pending but waiting out a backoff delay.
    pub delayed: u64,
    pub leased: u64,
    pub dead_letter: u64,
}

impl QueueDepth {
    /// Tasks that will still be delivered (excludes the dead-letter lane).
    pub fn outstanding(&self) -> u64 {
        self.ready + self.delayed + self.leased
    }
}

/// Result of an atomic budget check-and-increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetCheck {
    Allowed { hour_count: u32, day_count: u32 },
    HourlyCapReached,
    DailyCapReached,
}

/// Stored per-user alert counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertBudget {
    pub hour_bucket: String,
    pub hour_count: u32,
    pub day_bucket: String,
    pub day_count: u32,
}

/// Result of the compare-and-swap snapshot replace.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotSwap {
    /// The new snapshot is now current; `previous` is what it replaced.
    Replaced { previous: Option<Snapshot> },
    /// A newer snapshot is already stored; nothing was written.
    Stale { current_observed_at: DateTime<Utc> },
}

/// One row of the scrape log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeLogEntry {
    pub venue_id: VenueId,
    pub task_id: TaskId,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub slot_count: u32,
    pub error: Option<String>,
}

/// A historical slot observation examined by retention.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub id: i64,
    pub venue_name: String,
    pub slot: Slot,
    pub observed_at: DateTime<Utc>,
    /// An unexpired alert record exists for this slot key.
    pub has_live_alert: bool,
}

/// Summary of one retention run, persisted for anomaly detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionRunRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub scanned: u64,
    pub retained_by_preference: u64,
    pub retained_by_alert: u64,
    pub deleted: u64,
    pub logs_deleted: u64,
    pub alerts_purged: u64,
    pub errors: u64,
    pub anomalies: Vec<String>,
}
