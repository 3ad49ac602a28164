// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scrape task queue operations.
//!
//! Retry state (attempt count, next-eligible time, lease owner and expiry)
//! is explicit on each row. Every state transition runs in an IMMEDIATE
//! transaction so two workers can never lease the same task.

use chrono::{DateTime, Duration, Utc};
use courtwatch_core::{CourtwatchError, LeasedTask, Task, TaskId, TaskStatus, VenueId};
use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};

use crate::convert::{enum_at, ts, ts_at, ts_opt_at};
use crate::database::Database;
use crate::models::{FailOutcome, QueueDepth, ReclaimOutcome, RequeueOutcome};

const TASK_COLUMNS: &str = "id, venue_id, status, attempts, max_attempts, enqueued_at, \
                            available_at, last_error, dead_lettered_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: TaskId(row.get(0)?),
        venue_id: VenueId(row.get(1)?),
        status: enum_at(row, 2)?,
        attempts: row.get(3)?,
        max_attempts: row.get(4)?,
        enqueued_at: ts_at(row, 5)?,
        available_at: ts_at(row, 6)?,
        last_error: row.get(7)?,
        dead_lettered_at: ts_opt_at(row, 8)?,
    })
}

/// Insert a new pending task, visible immediately.
///
/// Does not touch the venue's single-flight marker; the scheduler goes
/// through `schedule::try_schedule` instead.
pub async fn insert_task(
    db: &Database,
    venue_id: &VenueId,
    max_attempts: u32,
    now: DateTime<Utc>,
) -> Result<Task, CourtwatchError> {
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
    let row = task.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO scrape_tasks (id, venue_id, status, attempts, max_attempts, enqueued_at, available_at)
                 VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?4)",
                params![row.id.as_str(), row.venue_id.as_str(), row.max_attempts, ts(now)],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    Ok(task)
}

/// Lease the oldest visible pending task to `worker_id` until `lease_until`.
///
/// Returns `None` if nothing is ready.
pub async fn lease_next(
    db: &Database,
    worker_id: &str,
    now: DateTime<Utc>,
    lease_until: DateTime<Utc>,
) -> Result<Option<LeasedTask>, CourtwatchError> {
    let worker_id = worker_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let task = tx
                .query_row(
                    &format!(
                        "SELECT {TASK_COLUMNS} FROM scrape_tasks
                         WHERE status = 'pending' AND available_at <= ?1
                         ORDER BY available_at ASC, enqueued_at ASC
                         LIMIT 1"
                    ),
                    params![ts(now)],
                    task_from_row,
                )
                .optional()?;

            let Some(task) = task else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE scrape_tasks SET status = 'leased', lease_owner = ?2, lease_expires_at = ?3
                 WHERE id = ?1",
                params![task.id.as_str(), worker_id, ts(lease_until)],
            )?;
            tx.commit()?;

            Ok(Some(LeasedTask {
                task: Task {
                    status: TaskStatus::Leased,
                    ..task
                },
                worker_id,
                lease_expires_at: lease_until,
            }))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete a successfully processed task and release the venue's marker.
///
/// Returns `false` if the caller no longer holds the lease (it expired and
/// was reclaimed); in that case nothing is changed.
pub async fn ack(
    db: &Database,
    task_id: &TaskId,
    worker_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, CourtwatchError> {
    let task_id = task_id.clone();
    let worker_id = worker_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let venue_id: Option<String> = tx
                .query_row(
                    "SELECT venue_id FROM scrape_tasks
                     WHERE id = ?1 AND status = 'leased' AND lease_owner = ?2",
                    params![task_id.as_str(), worker_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(venue_id) = venue_id else {
                return Ok(false);
            };

            tx.execute(
                "DELETE FROM scrape_tasks WHERE id = ?1",
                params![task_id.as_str()],
            )?;
            tx.execute(
                "UPDATE venue_schedule SET outstanding_task_id = NULL, last_completed_at = ?3
                 WHERE venue_id = ?1 AND outstanding_task_id = ?2",
                params![venue_id, task_id.as_str(), ts(now)],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a failed attempt for a leased task.
///
/// `terminal` failures dead-letter immediately. Otherwise the task is
/// requeued after `retry_delay(attempts)` unless it has used up its
/// attempts.
pub async fn fail<F>(
    db: &Database,
    task_id: &TaskId,
    worker_id: &str,
    error: &str,
    terminal: bool,
    now: DateTime<Utc>,
    retry_delay: F,
) -> Result<FailOutcome, CourtwatchError>
where
    F: Fn(u32) -> Duration + Send + 'static,
{
    let task_id = task_id.clone();
    let worker_id = worker_id.to_string();
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let row = tx
                .query_row(
                    "SELECT venue_id, attempts, max_attempts FROM scrape_tasks
                     WHERE id = ?1 AND status = 'leased' AND lease_owner = ?2",
                    params![task_id.as_str(), worker_id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?, row.get::<_, u32>(2)?)),
                )
                .optional()?;
            let Some((venue_id, attempts, max_attempts)) = row else {
                return Ok(FailOutcome::LeaseLost);
            };

            let attempts = attempts + 1;
            let outcome = if terminal || attempts >= max_attempts {
                dead_letter(&tx, &task_id, &venue_id, attempts, &error, now)?;
                FailOutcome::DeadLettered { attempts }
            } else {
                let available_at = now + retry_delay(attempts);
                requeue(&tx, &task_id, attempts, &error, available_at)?;
                FailOutcome::Retrying {
                    attempts,
                    available_at,
                }
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Return every task whose lease expired before `now` to the retry path.
///
/// Lease expiry counts as a failed attempt.
pub async fn reclaim_expired<F>(
    db: &Database,
    now: DateTime<Utc>,
    retry_delay: F,
) -> Result<ReclaimOutcome, CourtwatchError>
where
    F: Fn(u32) -> Duration + Send + 'static,
{
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let expired: Vec<(String, String, u32, u32)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, venue_id, attempts, max_attempts FROM scrape_tasks
                     WHERE status = 'leased' AND lease_expires_at <= ?1",
                )?;
                let rows = stmt.query_map(params![ts(now)], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?;
                rows.collect::<Result<_, _>>()?
            };

            let mut outcome = ReclaimOutcome::default();
            for (id, venue_id, attempts, max_attempts) in expired {
                let id = TaskId(id);
                let attempts = attempts + 1;
                let reason = "lease expired before acknowledgement";
                if attempts >= max_attempts {
                    dead_letter(&tx, &id, &venue_id, attempts, reason, now)?;
                    outcome.dead_lettered.push(id);
                } else {
                    requeue(&tx, &id, attempts, reason, now + retry_delay(attempts))?;
                    outcome.requeued.push(id);
                }
            }
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

fn requeue(
    tx: &Transaction<'_>,
    task_id: &TaskId,
    attempts: u32,
    error: &str,
    available_at: DateTime<Utc>,
) -> rusqlite::Result<()> {
    tx.execute(
        "UPDATE scrape_tasks SET status = 'pending', attempts = ?2, last_error = ?3,
            available_at = ?4, lease_owner = NULL, lease_expires_at = NULL
         WHERE id = ?1",
        params![task_id.as_str(), attempts, error, ts(available_at)],
    )?;
    Ok(())
}

/// Move a task to the dead-letter lane and free the venue for rescheduling.
fn dead_letter(
    tx: &Transaction<'_>,
    task_id: &TaskId,
    venue_id: &str,
    attempts: u32,
    error: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    tx.execute(
        "UPDATE scrape_tasks SET status = 'dead_letter', attempts = ?2, last_error = ?3,
            dead_lettered_at = ?4, lease_owner = NULL, lease_expires_at = NULL
         WHERE id = ?1",
        params![task_id.as_str(), attempts, error, ts(now)],
    )?;
    tx.execute(
        "UPDATE venue_schedule SET outstanding_task_id = NULL
         WHERE venue_id = ?1 AND outstanding_task_id = ?2",
        params![venue_id, task_id.as_str()],
    )?;
    Ok(())
}

/// Dead-lettered tasks, oldest first.
pub async fn list_dead_letters(db: &Database) -> Result<Vec<Task>, CourtwatchError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM scrape_tasks
                 WHERE status = 'dead_letter'
                 ORDER BY dead_lettered_at ASC"
            ))?;
            let rows = stmt.query_map([], task_from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Put a dead-lettered task back in the queue with a fresh attempt budget.
///
/// Refused while another task for the same venue is outstanding.
pub async fn requeue_dead_letter(
    db: &Database,
    task_id: &TaskId,
    now: DateTime<Utc>,
) -> Result<RequeueOutcome, CourtwatchError> {
    let task_id = task_id.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let venue_id: Option<String> = tx
                .query_row(
                    "SELECT venue_id FROM scrape_tasks WHERE id = ?1 AND status = 'dead_letter'",
                    params![task_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(venue_id) = venue_id else {
                return Ok(RequeueOutcome::NotFound);
            };

            let busy: Option<String> = tx
                .query_row(
                    "SELECT t.id FROM venue_schedule s
                     JOIN scrape_tasks t ON t.id = s.outstanding_task_id
                     WHERE s.venue_id = ?1 AND t.status IN ('pending', 'leased')",
                    params![venue_id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(other) = busy {
                return Ok(RequeueOutcome::VenueBusy {
                    task_id: TaskId(other),
                });
            }

            tx.execute(
                "UPDATE scrape_tasks SET status = 'pending', attempts = 0, available_at = ?2,
                    dead_lettered_at = NULL
                 WHERE id = ?1",
                params![task_id.as_str(), ts(now)],
            )?;
            tx.execute(
                "INSERT INTO venue_schedule (venue_id, last_enqueued_at, outstanding_task_id)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(venue_id) DO UPDATE SET
                    last_enqueued_at = excluded.last_enqueued_at,
                    outstanding_task_id = excluded.outstanding_task_id",
                params![venue_id, ts(now), task_id.as_str()],
            )?;
            tx.commit()?;
            Ok(RequeueOutcome::Requeued)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_task(db: &Database, task_id: &TaskId) -> Result<Option<Task>, CourtwatchError> {
    let task_id = task_id.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {TASK_COLUMNS} FROM scrape_tasks WHERE id = ?1"),
                params![task_id.as_str()],
                task_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Count tasks per lane as of `now`.
pub async fn depth(db: &Database, now: DateTime<Utc>) -> Result<QueueDepth, CourtwatchError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT
                    COALESCE(SUM(status = 'pending' AND available_at <= ?1), 0),
                    COALESCE(SUM(status = 'pending' AND available_at > ?1), 0),
                    COALESCE(SUM(status = 'leased'), 0),
                    COALESCE(SUM(status = 'dead_letter'), 0)
                 FROM scrape_tasks",
                params![ts(now)],
                |row| {
                    Ok(QueueDepth {
                        ready: row.get::<_, i64>(0)? as u64,
                        delayed: row.get::<_, i64>(1)? as u64,
                        leased: row.get::<_, i64>(2)? as u64,
                        dead_letter: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScheduleOutcome;
    use crate::queries::schedule;
    use crate::queries::test_support::{db_with_venues, t0};

    fn backoff(attempts: u32) -> Duration {
        Duration::seconds(30 * 2_i64.pow(attempts - 1))
    }

    fn lease() -> Duration {
        Duration::minutes(5)
    }

    async fn scheduled(db: &Database, venue: &str) -> Task {
        match schedule::try_schedule(db, &VenueId::from(venue), 3, t0())
            .await
            .unwrap()
        {
            ScheduleOutcome::Enqueued(task) => task,
            other => panic!("expected enqueue, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lease_hides_task_from_other_workers() {
        let db = db_with_venues(&["v1"]).await;
        let task = scheduled(&db, "v1").await;

        let leased = lease_next(&db, "w1", t0(), t0() + lease()).await.unwrap().unwrap();
        assert_eq!(leased.task.id, task.id);
        assert_eq!(leased.task.status, TaskStatus::Leased);
        assert_eq!(leased.worker_id, "w1");

        assert!(lease_next(&db, "w2", t0(), t0() + lease()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ack_removes_task_and_frees_venue() {
        let db = db_with_venues(&["v1"]).await;
        let task = scheduled(&db, "v1").await;
        lease_next(&db, "w1", t0(), t0() + lease()).await.unwrap().unwrap();

        assert!(!ack(&db, &task.id, "w2", t0()).await.unwrap(), "wrong owner");
        assert!(ack(&db, &task.id, "w1", t0()).await.unwrap());
        assert!(get_task(&db, &task.id).await.unwrap().is_none());

        let state = schedule::list_schedule(&db).await.unwrap();
        assert_eq!(state[0].outstanding_task_id, None);
        assert_eq!(state[0].last_completed_at, Some(t0()));
    }

    #[tokio::test]
    async fn fail_requeues_with_backoff() {
        let db = db_with_venues(&["v1"]).await;
        let task = scheduled(&db, "v1").await;
        lease_next(&db, "w1", t0(), t0() + lease()).await.unwrap().unwrap();

        let outcome = fail(&db, &task.id, "w1", "503", false, t0(), backoff).await.unwrap();
        assert_eq!(
            outcome,
            FailOutcome::Retrying {
                attempts: 1,
                available_at: t0() + Duration::seconds(30)
            }
        );

        // Invisible until the backoff elapses.
        assert!(lease_next(&db, "w1", t0() + Duration::seconds(29), t0() + lease())
            .await
            .unwrap()
            .is_none());
        let again = lease_next(&db, "w1", t0() + Duration::seconds(30), t0() + lease())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.task.attempts, 1);
        assert_eq!(again.task.last_error.as_deref(), Some("503"));
    }

    #[tokio::test]
    async fn dead_letters_after_max_attempts_exactly_once() {
        let db = db_with_venues(&["v1"]).await;
        let task = scheduled(&db, "v1").await;

        let mut now = t0();
        let mut outcomes = Vec::new();
        while let Some(leased) = lease_next(&db, "w1", now, now + lease()).await.unwrap() {
            outcomes.push(
                fail(&db, &leased.task.id, "w1", "timeout", false, now, backoff)
                    .await
                    .unwrap(),
            );
            now += Duration::hours(1);
        }

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[2], FailOutcome::DeadLettered { attempts: 3 });

        let dead = list_dead_letters(&db).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, task.id);
        assert_eq!(dead[0].attempts, 3);

        // The venue is free to be scheduled again.
        let state = schedule::list_schedule(&db).await.unwrap();
        assert_eq!(state[0].outstanding_task_id, None);
    }

    #[tokio::test]
    async fn terminal_failure_dead_letters_immediately() {
        let db = db_with_venues(&["v1"]).await;
        let task = scheduled(&db, "v1").await;
        lease_next(&db, "w1", t0(), t0() + lease()).await.unwrap().unwrap();

        let outcome = fail(&db, &task.id, "w1", "layout changed", true, t0(), backoff)
            .await
            .unwrap();
        assert_eq!(outcome, FailOutcome::DeadLettered { attempts: 1 });
        assert_eq!(depth(&db, t0()).await.unwrap().dead_letter, 1);
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimed_as_a_failed_attempt() {
        let db = db_with_venues(&["v1"]).await;
        let task = scheduled(&db, "v1").await;
        lease_next(&db, "w1", t0(), t0() + lease()).await.unwrap().unwrap();

        let early = reclaim_expired(&db, t0() + Duration::minutes(4), backoff).await.unwrap();
        assert!(early.requeued.is_empty());

        let at = t0() + lease();
        let outcome = reclaim_expired(&db, at, backoff).await.unwrap();
        assert_eq!(outcome.requeued, vec![task.id.clone()]);

        // The crashed worker can no longer ack or fail it.
        assert!(!ack(&db, &task.id, "w1", at).await.unwrap());
        assert_eq!(
            fail(&db, &task.id, "w1", "late", false, at, backoff).await.unwrap(),
            FailOutcome::LeaseLost
        );

        let stored = get_task(&db, &task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Pending);
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.available_at, at + Duration::seconds(30));
    }

    #[tokio::test]
    async fn requeue_dead_letter_respects_single_flight() {
        let db = db_with_venues(&["v1"]).await;
        let task = scheduled(&db, "v1").await;
        lease_next(&db, "w1", t0(), t0() + lease()).await.unwrap().unwrap();
        fail(&db, &task.id, "w1", "gone", true, t0(), backoff).await.unwrap();

        // A fresh scheduled task now occupies the venue.
        let later = t0() + Duration::minutes(10);
        let ScheduleOutcome::Enqueued(fresh) =
            schedule::try_schedule(&db, &VenueId::from("v1"), 3, later).await.unwrap()
        else {
            panic!("expected enqueue");
        };
        assert_eq!(
            requeue_dead_letter(&db, &task.id, later).await.unwrap(),
            RequeueOutcome::VenueBusy { task_id: fresh.id.clone() }
        );

        lease_next(&db, "w1", later, later + lease()).await.unwrap().unwrap();
        ack(&db, &fresh.id, "w1", later).await.unwrap();

        assert_eq!(
            requeue_dead_letter(&db, &task.id, later).await.unwrap(),
            RequeueOutcome::Requeued
        );
        let stored = get_task(&db, &task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Pending);
        assert_eq!(stored.attempts, 0);

        assert_eq!(
            requeue_dead_letter(&db, &TaskId::from("missing"), later).await.unwrap(),
            RequeueOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn concurrent_workers_never_share_a_task() {
        let db = db_with_venues(&["a", "b", "c", "d"]).await;
        for v in ["a", "b", "c", "d"] {
            insert_task(&db, &VenueId::from(v), 3, t0()).await.unwrap();
        }

        let mut handles = Vec::new();
        for w in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                lease_next(&db, &format!("w{w}"), t0(), t0() + lease()).await
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            if let Some(leased) = handle.await.unwrap().unwrap() {
                assert!(seen.insert(leased.task.id), "task delivered twice");
            }
        }
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn depth_splits_ready_and_delayed() {
        let db = db_with_venues(&["a", "b"]).await;
        insert_task(&db, &VenueId::from("a"), 3, t0()).await.unwrap();
        insert_task(&db, &VenueId::from("b"), 3, t0()).await.unwrap();

        let leased = lease_next(&db, "w1", t0(), t0() + lease()).await.unwrap().unwrap();
        fail(&db, &leased.task.id, "w1", "x", false, t0(), backoff).await.unwrap();

        let d = depth(&db, t0()).await.unwrap();
        assert_eq!(d, QueueDepth { ready: 1, delayed: 1, leased: 0, dead_letter: 0 });
        assert_eq!(d.outstanding(), 2);
    }
}
