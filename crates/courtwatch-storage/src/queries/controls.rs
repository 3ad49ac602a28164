// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator controls shared across processes.

use chrono::{DateTime, Utc};
use courtwatch_core::CourtwatchError;
use rusqlite::{params, OptionalExtension};

use crate::convert::ts;
use crate::database::Database;

/// Control name for the global scheduler pause flag.
pub const SCHEDULER_PAUSED: &str = "scheduler.paused";

pub async fn get_control(db: &Database, name: &str) -> Result<Option<String>, CourtwatchError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT value FROM controls WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn set_control(
    db: &Database,
    name: &str,
    value: &str,
    now: DateTime<Utc>,
) -> Result<(), CourtwatchError> {
    let name = name.to_string();
    let value = value.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO controls (name, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![name, value, ts(now)],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Whether the scheduler's enqueue step is paused.
pub async fn is_paused(db: &Database) -> Result<bool, CourtwatchError> {
    Ok(get_control(db, SCHEDULER_PAUSED).await?.as_deref() == Some("true"))
}

pub async fn set_paused(db: &Database, paused: bool, now: DateTime<Utc>) -> Result<(), CourtwatchError> {
    set_control(db, SCHEDULER_PAUSED, if paused { "true" } else { "false" }, now).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::t0;

    #[tokio::test]
    async fn pause_flag_round_trip() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(!is_paused(&db).await.unwrap());
        set_paused(&db, true, t0()).await.unwrap();
        assert!(is_paused(&db).await.unwrap());
        set_paused(&db, false, t0()).await.unwrap();
        assert!(!is_paused(&db).await.unwrap());
    }
}
