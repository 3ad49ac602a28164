// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batched reads and deletes for the retention service.
//!
//! Batches are keyset-paginated on the observation id so that retained rows
//! are never re-scanned within one run.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use courtwatch_core::{CourtwatchError, Slot, SlotKey, VenueId};
use rusqlite::types::Type;
use rusqlite::{params, Row};

use crate::convert::{json_at, to_json, ts, ts_at};
use crate::database::Database;
use crate::models::{ObservationRecord, RetentionRunRecord};

fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: String = row.get(idx)?;
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Next batch of observations older than `cutoff` with id greater than `after_id`.
///
/// Each record carries whether an alert record for its slot key is still
/// live at `now`, and the venue's display name for preference matching.
pub async fn observation_batch(
    db: &Database,
    cutoff: DateTime<Utc>,
    after_id: i64,
    limit: u32,
    now: DateTime<Utc>,
) -> Result<Vec<ObservationRecord>, CourtwatchError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT o.id, o.venue_id, COALESCE(v.name, o.venue_id), o.court, o.slot_date,
                        o.start_time, o.end_time, o.price, o.available, o.observed_at,
                        EXISTS(SELECT 1 FROM alert_records a
                               WHERE a.slot_key = o.slot_key AND a.expires_at > ?4)
                 FROM slot_observations o
                 LEFT JOIN venues v ON v.id = o.venue_id
                 WHERE o.observed_at < ?1 AND o.id > ?2
                 ORDER BY o.id ASC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![ts(cutoff), after_id, limit, ts(now)], |row| {
                Ok(ObservationRecord {
                    id: row.get(0)?,
                    venue_name: row.get(2)?,
                    slot: Slot {
                        key: SlotKey {
                            venue_id: VenueId(row.get(1)?),
                            court: row.get(3)?,
                            date: date_at(row, 4)?,
                            start: time_at(row, 5)?,
                            end: time_at(row, 6)?,
                        },
                        price: row.get(7)?,
                        available: row.get(8)?,
                    },
                    observed_at: ts_at(row, 9)?,
                    has_live_alert: row.get(10)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete observations by id in one transaction. Returns rows deleted.
pub async fn delete_observations(db: &Database, ids: Vec<i64>) -> Result<usize, CourtwatchError> {
    if ids.is_empty() {
        return Ok(0);
    }
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut deleted = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM slot_observations WHERE id = ?1")?;
                for id in &ids {
                    deleted += stmt.execute(params![id])?;
                }
            }
            tx.commit()?;
            Ok(deleted)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Scrape log rows that finished before `cutoff`.
pub async fn count_scrape_logs_before(
    db: &Database,
    cutoff: DateTime<Utc>,
) -> Result<u64, CourtwatchError> {
    db.connection()
        .call(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM scrape_logs WHERE finished_at < ?1",
                params![ts(cutoff)],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete up to `limit` scrape log rows that finished before `cutoff`.
pub async fn delete_scrape_logs_batch(
    db: &Database,
    cutoff: DateTime<Utc>,
    limit: u32,
) -> Result<usize, CourtwatchError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM scrape_logs WHERE id IN (
                    SELECT id FROM scrape_logs WHERE finished_at < ?1 ORDER BY id LIMIT ?2
                 )",
                params![ts(cutoff), limit],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn record_run(db: &Database, run: &RetentionRunRecord) -> Result<(), CourtwatchError> {
    let run = run.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO retention_runs
                    (started_at, finished_at, dry_run, scanned, retained_by_preference,
                     retained_by_alert, deleted, logs_deleted, alerts_purged, errors, anomalies)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    ts(run.started_at),
                    ts(run.finished_at),
                    run.dry_run,
                    run.scanned as i64,
                    run.retained_by_preference as i64,
                    run.retained_by_alert as i64,
                    run.deleted as i64,
                    run.logs_deleted as i64,
                    run.alerts_purged as i64,
                    run.errors as i64,
                    to_json(&run.anomalies)?,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The most recent non-dry-run retention runs, newest first.
pub async fn recent_runs(
    db: &Database,
    limit: u32,
) -> Result<Vec<RetentionRunRecord>, CourtwatchError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT started_at, finished_at, dry_run, scanned, retained_by_preference,
                        retained_by_alert, deleted, logs_deleted, alerts_purged, errors, anomalies
                 FROM retention_runs
                 WHERE dry_run = 0
                 ORDER BY id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(RetentionRunRecord {
                    started_at: ts_at(row, 0)?,
                    finished_at: ts_at(row, 1)?,
                    dry_run: row.get(2)?,
                    scanned: row.get::<_, i64>(3)? as u64,
                    retained_by_preference: row.get::<_, i64>(4)? as u64,
                    retained_by_alert: row.get::<_, i64>(5)? as u64,
                    deleted: row.get::<_, i64>(6)? as u64,
                    logs_deleted: row.get::<_, i64>(7)? as u64,
                    alerts_purged: row.get::<_, i64>(8)? as u64,
                    errors: row.get::<_, i64>(9)? as u64,
                    anomalies: json_at(row, 10)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
