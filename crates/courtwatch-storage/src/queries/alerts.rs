// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert record (dedup ledger) persistence.

use chrono::{DateTime, Utc};
use courtwatch_core::{AlertRecord, CourtwatchError, UserId};
use rusqlite::{params, OptionalExtension};

use crate::convert::{ts, ts_at};
use crate::database::Database;

/// Insert a record for (user, slot key) unless a live one already exists.
///
/// A single conditional upsert: an expired record is re-armed (keeping
/// `first_sent_at` and bumping `send_count`), a live record is left alone.
/// Returns `true` if this call created or re-armed the record.
pub async fn try_claim(
    db: &Database,
    user_id: &UserId,
    slot_key: &str,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<bool, CourtwatchError> {
    let user_id = user_id.clone();
    let slot_key = slot_key.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT INTO alert_records (user_id, slot_key, first_sent_at, sent_at, expires_at, send_count)
                 VALUES (?1, ?2, ?3, ?3, ?4, 1)
                 ON CONFLICT(user_id, slot_key) DO UPDATE SET
                    sent_at = excluded.sent_at,
                    expires_at = excluded.expires_at,
                    send_count = alert_records.send_count + 1
                 WHERE alert_records.expires_at <= excluded.sent_at",
                params![user_id.as_str(), slot_key, ts(now), ts(expires_at)],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Create or overwrite the record for (user, slot key) unconditionally.
pub async fn record_sent(
    db: &Database,
    user_id: &UserId,
    slot_key: &str,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<(), CourtwatchError> {
    let user_id = user_id.clone();
    let slot_key = slot_key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO alert_records (user_id, slot_key, first_sent_at, sent_at, expires_at, send_count)
                 VALUES (?1, ?2, ?3, ?3, ?4, 1)
                 ON CONFLICT(user_id, slot_key) DO UPDATE SET
                    sent_at = excluded.sent_at,
                    expires_at = excluded.expires_at,
                    send_count = alert_records.send_count + 1",
                params![user_id.as_str(), slot_key, ts(now), ts(expires_at)],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The live (unexpired at `now`) record for (user, slot key), if any.
pub async fn find_live(
    db: &Database,
    user_id: &UserId,
    slot_key: &str,
    now: DateTime<Utc>,
) -> Result<Option<AlertRecord>, CourtwatchError> {
    let user_id = user_id.clone();
    let slot_key = slot_key.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT user_id, slot_key, first_sent_at, sent_at, expires_at, send_count
                 FROM alert_records
                 WHERE user_id = ?1 AND slot_key = ?2 AND expires_at > ?3",
                params![user_id.as_str(), slot_key, ts(now)],
                |row| {
                    Ok(AlertRecord {
                        user_id: UserId(row.get(0)?),
                        slot_key: row.get(1)?,
                        first_sent_at: ts_at(row, 2)?,
                        sent_at: ts_at(row, 3)?,
                        expires_at: ts_at(row, 4)?,
                        send_count: row.get(5)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete up to `limit` records that expired at or before `now`.
pub async fn purge_expired(
    db: &Database,
    now: DateTime<Utc>,
    limit: u32,
) -> Result<usize, CourtwatchError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM alert_records WHERE rowid IN (
                    SELECT rowid FROM alert_records WHERE expires_at <= ?1 LIMIT ?2
                 )",
                params![ts(now), limit],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Number of records that expired at or before `now`.
pub async fn count_expired(db: &Database, now: DateTime<Utc>) -> Result<u64, CourtwatchError> {
    db.connection()
        .call(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM alert_records WHERE expires_at <= ?1",
                params![ts(now)],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Number of live records across all users.
pub async fn count_live(db: &Database, now: DateTime<Utc>) -> Result<u64, CourtwatchError> {
    db.connection()
        .call(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM alert_records WHERE expires_at > ?1",
                params![ts(now)],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
