// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Venue persistence. Venues are upserted from configuration and never deleted.

use chrono::{DateTime, Utc};
use courtwatch_core::{CourtwatchError, Venue, VenueId};
use rusqlite::{params, OptionalExtension, Row};

use crate::convert::{json_at, to_json, ts};
use crate::database::Database;

pub(crate) const VENUE_COLUMNS: &str = "v.id, v.name, v.url, v.interval_minutes, v.active, v.scraper";

/// Map the six [`VENUE_COLUMNS`] starting at `offset`.
pub(crate) fn venue_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Venue> {
    Ok(Venue {
        id: VenueId(row.get(offset)?),
        name: row.get(offset + 1)?,
        url: row.get(offset + 2)?,
        interval_minutes: row.get(offset + 3)?,
        active: row.get(offset + 4)?,
        scraper: json_at(row, offset + 5)?,
    })
}

/// Insert or update a venue and make sure it has a schedule row.
pub async fn upsert_venue(
    db: &Database,
    venue: &Venue,
    now: DateTime<Utc>,
) -> Result<(), CourtwatchError> {
    let venue = venue.clone();
    db.connection()
        .call(move |conn| {
            let scraper = to_json(&venue.scraper)?;
            let now = ts(now);
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO venues (id, name, url, interval_minutes, active, scraper, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    url = excluded.url,
                    interval_minutes = excluded.interval_minutes,
                    active = excluded.active,
                    scraper = excluded.scraper,
                    updated_at = excluded.updated_at",
                params![
                    venue.id.as_str(),
                    venue.name,
                    venue.url,
                    venue.interval_minutes,
                    venue.active,
                    scraper,
                    now
                ],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO venue_schedule (venue_id) VALUES (?1)",
                params![venue.id.as_str()],
            )?;
            tx.commit()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark every venue not in `keep` as inactive. Returns how many changed.
pub async fn deactivate_except(
    db: &Database,
    keep: &[VenueId],
    now: DateTime<Utc>,
) -> Result<usize, CourtwatchError> {
    let keep: Vec<String> = keep.iter().map(|id| id.0.clone()).collect();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let ids: Vec<String> = {
                let mut stmt = tx.prepare("SELECT id FROM venues WHERE active = 1")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            };
            let mut changed = 0;
            for id in ids.iter().filter(|id| !keep.contains(id)) {
                changed += tx.execute(
                    "UPDATE venues SET active = 0, updated_at = ?2 WHERE id = ?1",
                    params![id, ts(now)],
                )?;
            }
            tx.commit()?;
            Ok(changed)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Toggle a venue's active flag.
pub async fn set_active(
    db: &Database,
    id: &VenueId,
    active: bool,
    now: DateTime<Utc>,
) -> Result<bool, CourtwatchError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE venues SET active = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, active, ts(now)],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_venue(db: &Database, id: &VenueId) -> Result<Option<Venue>, CourtwatchError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {VENUE_COLUMNS} FROM venues v WHERE v.id = ?1"),
                params![id],
                |row| venue_from_row(row, 0),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn list_venues(db: &Database) -> Result<Vec<Venue>, CourtwatchError> {
    db.connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {VENUE_COLUMNS} FROM venues v ORDER BY v.id"))?;
            let rows = stmt.query_map([], |row| venue_from_row(row, 0))?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
