// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Current-snapshot store and slot-observation history.

use courtwatch_core::{CourtwatchError, Slot, Snapshot, VenueId};
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::convert::{json_at, to_json, ts, ts_at};
use crate::database::Database;
use crate::models::SnapshotSwap;

pub async fn load_snapshot(
    db: &Database,
    venue_id: &VenueId,
) -> Result<Option<Snapshot>, CourtwatchError> {
    let venue_id = venue_id.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT observed_at, slots FROM snapshots WHERE venue_id = ?1",
                params![venue_id.as_str()],
                |row| {
                    Ok(Snapshot {
                        venue_id: venue_id.clone(),
                        observed_at: ts_at(row, 0)?,
                        slots: json_at(row, 1)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Atomically replace the venue's current snapshot and append its slots to
/// the observation history.
///
/// Compare-and-swap on `observed_at`: a snapshot older than the stored one
/// is rejected as [`SnapshotSwap::Stale`] and nothing is written. The
/// previous snapshot is returned so the caller can diff against exactly
/// what was replaced.
pub async fn replace_snapshot(
    db: &Database,
    snapshot: &Snapshot,
) -> Result<SnapshotSwap, CourtwatchError> {
    let snapshot = snapshot.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let venue_id = snapshot.venue_id.as_str();

            let previous = tx
                .query_row(
                    "SELECT observed_at, slots FROM snapshots WHERE venue_id = ?1",
                    params![venue_id],
                    |row| {
                        Ok(Snapshot {
                            venue_id: snapshot.venue_id.clone(),
                            observed_at: ts_at(row, 0)?,
                            slots: json_at::<Vec<Slot>>(row, 1)?,
                        })
                    },
                )
                .optional()?;

            if let Some(prev) = &previous
                && prev.observed_at > snapshot.observed_at
            {
                return Ok(SnapshotSwap::Stale {
                    current_observed_at: prev.observed_at,
                });
            }

            let observed_at = ts(snapshot.observed_at);
            tx.execute(
                "INSERT INTO snapshots (venue_id, observed_at, slots) VALUES (?1, ?2, ?3)
                 ON CONFLICT(venue_id) DO UPDATE SET
                    observed_at = excluded.observed_at,
                    slots = excluded.slots",
                params![venue_id, observed_at, to_json(&snapshot.slots)?],
            )?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO slot_observations
                        (venue_id, slot_key, court, slot_date, start_time, end_time, price, available, observed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )?;
                for slot in &snapshot.slots {
                    let key = &slot.key;
                    stmt.execute(params![
                        venue_id,
                        key.to_string(),
                        key.court,
                        key.date.format("%Y-%m-%d").to_string(),
                        key.start.format("%H:%M").to_string(),
                        key.end.format("%H:%M").to_string(),
                        slot.price,
                        slot.available,
                        observed_at,
                    ])?;
                }
            }

            tx.commit()?;
            Ok(SnapshotSwap::Replaced { previous })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Number of rows in the observation history.
pub async fn count_observations(db: &Database) -> Result<u64, CourtwatchError> {
    db.connection()
        .call(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM slot_observations", [], |row| {
                row.get(0)
            })?;
            Ok(n as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{db_with_venues, t0};
    use chrono::{NaiveDate, NaiveTime};
    use courtwatch_core::SlotKey;

    fn slot(court: &str, hour: u32, price: f64) -> Slot {
        Slot {
            key: SlotKey {
                venue_id: VenueId::from("v1"),
                court: court.to_string(),
                date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
                start: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
            },
            price,
            available: true,
        }
    }

    fn snapshot(at: chrono::DateTime<chrono::Utc>, slots: Vec<Slot>) -> Snapshot {
        Snapshot {
            venue_id: VenueId::from("v1"),
            observed_at: at,
            slots,
        }
    }

    #[tokio::test]
    async fn first_replace_has_no_previous() {
        let db = db_with_venues(&["v1"]).await;
        let snap = snapshot(t0(), vec![slot("Court 1", 18, 15.0)]);

        let swap = replace_snapshot(&db, &snap).await.unwrap();
        assert_eq!(swap, SnapshotSwap::Replaced { previous: None });
        assert_eq!(load_snapshot(&db, &VenueId::from("v1")).await.unwrap(), Some(snap));
        assert_eq!(count_observations(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn replace_returns_what_it_replaced() {
        let db = db_with_venues(&["v1"]).await;
        let first = snapshot(t0(), vec![slot("Court 1", 18, 15.0)]);
        let second = snapshot(
            t0() + chrono::Duration::minutes(5),
            vec![slot("Court 2", 19, 12.0)],
        );
        replace_snapshot(&db, &first).await.unwrap();

        let swap = replace_snapshot(&db, &second).await.unwrap();
        assert_eq!(swap, SnapshotSwap::Replaced { previous: Some(first) });
        assert_eq!(count_observations(&db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn older_snapshot_is_rejected() {
        let db = db_with_venues(&["v1"]).await;
        let newer = snapshot(t0(), vec![slot("Court 1", 18, 15.0)]);
        let older = snapshot(t0() - chrono::Duration::minutes(5), vec![]);
        replace_snapshot(&db, &newer).await.unwrap();

        let swap = replace_snapshot(&db, &older).await.unwrap();
        assert_eq!(
            swap,
            SnapshotSwap::Stale {
                current_observed_at: t0()
            }
        );
        assert_eq!(load_snapshot(&db, &VenueId::from("v1")).await.unwrap(), Some(newer));
    }

    #[tokio::test]
    async fn empty_snapshot_is_stored() {
        let db = db_with_venues(&["v1"]).await;
        replace_snapshot(&db, &snapshot(t0(), vec![])).await.unwrap();
        let stored = load_snapshot(&db, &VenueId::from("v1")).await.unwrap().unwrap();
        assert!(stored.slots.is_empty());
    }
}
