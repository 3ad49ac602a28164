// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scrape log: one row per processed task attempt.

use courtwatch_core::{CourtwatchError, TaskId, VenueId};
use rusqlite::params;

use crate::convert::{ts, ts_at};
use crate::database::Database;
use crate::models::ScrapeLogEntry;

pub async fn insert_log(db: &Database, entry: &ScrapeLogEntry) -> Result<(), CourtwatchError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO scrape_logs
                    (venue_id, task_id, attempt, started_at, finished_at, success, slot_count, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.venue_id.as_str(),
                    entry.task_id.as_str(),
                    entry.attempt,
                    ts(entry.started_at),
                    ts(entry.finished_at),
                    entry.success,
                    entry.slot_count,
                    entry.error,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Most recent log rows, newest first, optionally for one venue.
pub async fn recent_logs(
    db: &Database,
    venue_id: Option<&VenueId>,
    limit: u32,
) -> Result<Vec<ScrapeLogEntry>, CourtwatchError> {
    let venue_id = venue_id.map(|v| v.0.clone());
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT venue_id, task_id, attempt, started_at, finished_at, success, slot_count, error
                 FROM scrape_logs
                 WHERE ?1 IS NULL OR venue_id = ?1
                 ORDER BY finished_at DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![venue_id, limit], |row| {
                Ok(ScrapeLogEntry {
                    venue_id: VenueId(row.get(0)?),
                    task_id: TaskId(row.get(1)?),
                    attempt: row.get(2)?,
                    started_at: ts_at(row, 3)?,
                    finished_at: ts_at(row, 4)?,
                    success: row.get(5)?,
                    slot_count: row.get(6)?,
                    error: row.get(7)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
