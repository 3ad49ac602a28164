// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted per-venue scheduler state.
//!
//! `last_enqueued_at` and the outstanding-task marker live in the database
//! rather than in scheduler memory, so any number of scheduler instances can
//! tick against the same store. [`try_schedule`] reads and updates them in
//! one IMMEDIATE transaction.

use chrono::{DateTime, Utc};
use courtwatch_core::{CourtwatchError, Task, TaskId, TaskStatus, VenueId};
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::convert::{ts, ts_opt_at};
use crate::database::Database;
use crate::models::{ScheduleOutcome, VenueScheduleState};
use crate::queries::venues::{venue_from_row, VENUE_COLUMNS};

/// Enqueue a task for `venue_id` if it is active, due, and has no outstanding task.
pub async fn try_schedule(
    db: &Database,
    venue_id: &VenueId,
    max_attempts: u32,
    now: DateTime<Utc>,
) -> Result<ScheduleOutcome, CourtwatchError> {
    let venue_id = venue_id.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let state = tx
                .query_row(
                    "SELECT v.active, v.interval_minutes, s.last_enqueued_at, s.outstanding_task_id
                     FROM venues v LEFT JOIN venue_schedule s ON s.venue_id = v.id
                     WHERE v.id = ?1",
                    params![venue_id.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, bool>(0)?,
                            row.get::<_, u32>(1)?,
                            ts_opt_at(row, 2)?,
                            row.get::<_, Option<String>>(3)?,
                        ))
                    },
                )
                .optional()?;

            let Some((active, interval_minutes, last_enqueued_at, outstanding)) = state else {
                return Ok(ScheduleOutcome::Inactive);
            };
            if !active {
                return Ok(ScheduleOutcome::Inactive);
            }

            if let Some(task_id) = outstanding {
                let still_exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM scrape_tasks
                                   WHERE id = ?1 AND status IN ('pending', 'leased'))",
                    params![task_id],
                    |row| row.get(0),
                )?;
                if still_exists {
                    return Ok(ScheduleOutcome::Outstanding {
                        task_id: TaskId(task_id),
                    });
                }
            }

            if let Some(last) = last_enqueued_at {
                let next_due_at = last + chrono::Duration::minutes(i64::from(interval_minutes));
                if now < next_due_at {
                    return Ok(ScheduleOutcome::NotDue { next_due_at });
                }
            }

            let task = Task {
                id: TaskId::generate(),
                venue_id: venue_id.clone(),
                status: TaskStatus::Pending,
                attempts: 0,
                max_attempts,
                enqueued_at: now,
                available_at: now,
                last_error: None,
                dead_lettered_at: None,
            };
            tx.execute(
                "INSERT INTO scrape_tasks (id, venue_id, status, attempts, max_attempts, enqueued_at, available_at)
                 VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?4)",
                params![task.id.as_str(), venue_id.as_str(), max_attempts, ts(now)],
            )?;
            tx.execute(
                "INSERT INTO venue_schedule (venue_id, last_enqueued_at, outstanding_task_id)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(venue_id) DO UPDATE SET
                    last_enqueued_at = excluded.last_enqueued_at,
                    outstanding_task_id = excluded.outstanding_task_id",
                params![venue_id.as_str(), ts(now), task.id.as_str()],
            )?;
            tx.commit()?;
            Ok(ScheduleOutcome::Enqueued(task))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Scheduler state for every known venue, active or not.
pub async fn list_schedule(db: &Database) -> Result<Vec<VenueScheduleState>, CourtwatchError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VENUE_COLUMNS}, s.last_enqueued_at, s.outstanding_task_id, s.last_completed_at
                 FROM venues v LEFT JOIN venue_schedule s ON s.venue_id = v.id
                 ORDER BY v.id"
            ))?;
            let rows = stmt.query_map([], |row| {
                Ok(VenueScheduleState {
                    venue: venue_from_row(row, 0)?,
                    last_enqueued_at: ts_opt_at(row, 6)?,
                    outstanding_task_id: row.get::<_, Option<String>>(7)?.map(TaskId),
                    last_completed_at: ts_opt_at(row, 8)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{db_with_venues, t0};
    use crate::queries::venues;

    fn minutes(n: i64) -> chrono::Duration {
        chrono::Duration::minutes(n)
    }

    #[tokio::test]
    async fn first_tick_enqueues() {
        let db = db_with_venues(&["v1"]).await;
        let outcome = try_schedule(&db, &VenueId::from("v1"), 4, t0()).await.unwrap();
        let ScheduleOutcome::Enqueued(task) = outcome else {
            panic!("expected enqueue, got {outcome:?}");
        };
        assert_eq!(task.venue_id.as_str(), "v1");
        assert_eq!(task.attempts, 0);

        let state = list_schedule(&db).await.unwrap();
        assert_eq!(state[0].last_enqueued_at, Some(t0()));
        assert_eq!(state[0].outstanding_task_id, Some(task.id));
    }

    #[tokio::test]
    async fn outstanding_task_blocks_even_when_due() {
        let db = db_with_venues(&["v1"]).await;
        let id = VenueId::from("v1");
        try_schedule(&db, &id, 4, t0()).await.unwrap();

        let outcome = try_schedule(&db, &id, 4, t0() + minutes(30)).await.unwrap();
        assert!(matches!(outcome, ScheduleOutcome::Outstanding { .. }));
    }

    #[tokio::test]
    async fn not_due_until_interval_elapses() {
        let db = db_with_venues(&["v1"]).await;
        let id = VenueId::from("v1");
        let ScheduleOutcome::Enqueued(task) = try_schedule(&db, &id, 4, t0()).await.unwrap()
        else {
            panic!("expected enqueue");
        };

        // Clear the outstanding marker as a successful ack would.
        let task_id = task.id.clone();
        db.connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute("DELETE FROM scrape_tasks WHERE id = ?1", params![task_id.as_str()])?;
                Ok(())
            })
            .await
            .unwrap();

        let outcome = try_schedule(&db, &id, 4, t0() + minutes(4)).await.unwrap();
        assert_eq!(
            outcome,
            ScheduleOutcome::NotDue {
                next_due_at: t0() + minutes(5)
            }
        );

        let outcome = try_schedule(&db, &id, 4, t0() + minutes(5)).await.unwrap();
        assert!(matches!(outcome, ScheduleOutcome::Enqueued(_)));
    }

    #[tokio::test]
    async fn inactive_and_unknown_venues_are_skipped() {
        let db = db_with_venues(&["v1"]).await;
        let id = VenueId::from("v1");
        venues::set_active(&db, &id, false, t0()).await.unwrap();

        assert_eq!(
            try_schedule(&db, &id, 4, t0()).await.unwrap(),
            ScheduleOutcome::Inactive
        );
        assert_eq!(
            try_schedule(&db, &VenueId::from("ghost"), 4, t0()).await.unwrap(),
            ScheduleOutcome::Inactive
        );
    }

    #[tokio::test]
    async fn concurrent_schedulers_enqueue_once() {
        let db = db_with_venues(&["v1"]).await;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                try_schedule(&db, &VenueId::from("v1"), 4, t0()).await
            }));
        }

        let mut enqueued = 0;
        for handle in handles {
            if matches!(handle.await.unwrap().unwrap(), ScheduleOutcome::Enqueued(_)) {
                enqueued += 1;
            }
        }
        assert_eq!(enqueued, 1);
    }
}
