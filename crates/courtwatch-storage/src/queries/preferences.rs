// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User preference persistence.

use chrono::{DateTime, Utc};
use courtwatch_core::{CourtwatchError, UserId, UserPreferences};
use rusqlite::{params, OptionalExtension, Row};

use crate::convert::{json_at, to_json, ts};
use crate::database::Database;

fn prefs_from_row(row: &Row<'_>) -> rusqlite::Result<UserPreferences> {
    let mut prefs: UserPreferences = json_at(row, 0)?;
    prefs.active = row.get(1)?;
    Ok(prefs)
}

pub async fn upsert_user(
    db: &Database,
    prefs: &UserPreferences,
    now: DateTime<Utc>,
) -> Result<(), CourtwatchError> {
    let prefs = prefs.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO user_preferences (user_id, email, active, preferences, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                    email = excluded.email,
                    active = excluded.active,
                    preferences = excluded.preferences,
                    updated_at = excluded.updated_at",
                params![
                    prefs.user_id.as_str(),
                    prefs.email,
                    prefs.active,
                    to_json(&prefs)?,
                    ts(now)
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark every user not in `keep` as inactive. Returns how many changed.
pub async fn deactivate_except(
    db: &Database,
    keep: &[UserId],
    now: DateTime<Utc>,
) -> Result<usize, CourtwatchError> {
    let keep: Vec<String> = keep.iter().map(|id| id.0.clone()).collect();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let ids: Vec<String> = {
                let mut stmt = tx.prepare("SELECT user_id FROM user_preferences WHERE active = 1")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            };
            let mut changed = 0;
            for id in ids.iter().filter(|id| !keep.contains(id)) {
                changed += tx.execute(
                    "UPDATE user_preferences SET active = 0, updated_at = ?2 WHERE user_id = ?1",
                    params![id, ts(now)],
                )?;
            }
            tx.commit()?;
            Ok(changed)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_user(
    db: &Database,
    user_id: &UserId,
) -> Result<Option<UserPreferences>, CourtwatchError> {
    let user_id = user_id.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT preferences, active FROM user_preferences WHERE user_id = ?1",
                params![user_id.as_str()],
                prefs_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Active users, including unsubscribed ones.
pub async fn list_active_users(db: &Database) -> Result<Vec<UserPreferences>, CourtwatchError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT preferences, active FROM user_preferences
                 WHERE active = 1 ORDER BY user_id",
            )?;
            let rows = stmt.query_map([], prefs_from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
