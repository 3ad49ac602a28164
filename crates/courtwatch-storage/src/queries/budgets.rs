// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user alert budget counters.
//!
//! Buckets are calendar strings chosen by the caller (`2026-03-14T18`,
//! `2026-03-14`). A stored bucket that differs from the current one means
//! the boundary has passed and the counter restarts at zero.

use courtwatch_core::{CourtwatchError, UserId};
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::database::Database;
use crate::models::{AlertBudget, BudgetCheck};

/// Check both caps and, if neither is reached, count one alert.
///
/// A cap of zero means unlimited. Check and increment happen in one
/// IMMEDIATE transaction.
pub async fn increment_if_allowed(
    db: &Database,
    user_id: &UserId,
    hour_bucket: &str,
    day_bucket: &str,
    hour_cap: u32,
    day_cap: u32,
) -> Result<BudgetCheck, CourtwatchError> {
    let user_id = user_id.clone();
    let hour_bucket = hour_bucket.to_string();
    let day_bucket = day_bucket.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let stored = read_budget(&tx, &user_id)?;

            let (hour_count, day_count) = match stored {
                Some(b) => (
                    if b.hour_bucket == hour_bucket { b.hour_count } else { 0 },
                    if b.day_bucket == day_bucket { b.day_count } else { 0 },
                ),
                None => (0, 0),
            };

            if day_cap > 0 && day_count >= day_cap {
                return Ok(BudgetCheck::DailyCapReached);
            }
            if hour_cap > 0 && hour_count >= hour_cap {
                return Ok(BudgetCheck::HourlyCapReached);
            }

            let (hour_count, day_count) = (hour_count + 1, day_count + 1);
            tx.execute(
                "INSERT INTO alert_budgets (user_id, hour_bucket, hour_count, day_bucket, day_count)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                    hour_bucket = excluded.hour_bucket,
                    hour_count = excluded.hour_count,
                    day_bucket = excluded.day_bucket,
                    day_count = excluded.day_count",
                params![user_id.as_str(), hour_bucket, hour_count, day_bucket, day_count],
            )?;
            tx.commit()?;
            Ok(BudgetCheck::Allowed {
                hour_count,
                day_count,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Give back one alert counted in the given buckets.
///
/// No-op if the buckets have since rolled over.
pub async fn refund(
    db: &Database,
    user_id: &UserId,
    hour_bucket: &str,
    day_bucket: &str,
) -> Result<(), CourtwatchError> {
    let user_id = user_id.clone();
    let hour_bucket = hour_bucket.to_string();
    let day_bucket = day_bucket.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "UPDATE alert_budgets SET hour_count = hour_count - 1
                 WHERE user_id = ?1 AND hour_bucket = ?2 AND hour_count > 0",
                params![user_id.as_str(), hour_bucket],
            )?;
            tx.execute(
                "UPDATE alert_budgets SET day_count = day_count - 1
                 WHERE user_id = ?1 AND day_bucket = ?2 AND day_count > 0",
                params![user_id.as_str(), day_bucket],
            )?;
            tx.commit()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_budget(
    db: &Database,
    user_id: &UserId,
) -> Result<Option<AlertBudget>, CourtwatchError> {
    let user_id = user_id.clone();
    db.connection()
        .call(move |conn| read_budget(conn, &user_id))
        .await
        .map_err(crate::database::map_tr_err)
}

fn read_budget(
    conn: &rusqlite::Connection,
    user_id: &UserId,
) -> rusqlite::Result<Option<AlertBudget>> {
    conn.query_row(
        "SELECT hour_bucket, hour_count, day_bucket, day_count
         FROM alert_budgets WHERE user_id = ?1",
        params![user_id.as_str()],
        |row| {
            Ok(AlertBudget {
                hour_bucket: row.get(0)?,
                hour_count: row.get(1)?,
                day_bucket: row.get(2)?,
                day_count: row.get(3)?,
            })
        },
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hourly_cap_resets_on_new_bucket() {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserId::from("u1");

        for n in 1..=2 {
            let check = increment_if_allowed(&db, &user, "2026-03-14T18", "2026-03-14", 2, 10)
                .await
                .unwrap();
            assert_eq!(check, BudgetCheck::Allowed { hour_count: n, day_count: n });
        }
        assert_eq!(
            increment_if_allowed(&db, &user, "2026-03-14T18", "2026-03-14", 2, 10)
                .await
                .unwrap(),
            BudgetCheck::HourlyCapReached
        );

        let check = increment_if_allowed(&db, &user, "2026-03-14T19", "2026-03-14", 2, 10)
            .await
            .unwrap();
        assert_eq!(check, BudgetCheck::Allowed { hour_count: 1, day_count: 3 });
    }

    #[tokio::test]
    async fn daily_cap_wins_over_fresh_hour() {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserId::from("u1");
        increment_if_allowed(&db, &user, "2026-03-14T08", "2026-03-14", 5, 1)
            .await
            .unwrap();
        assert_eq!(
            increment_if_allowed(&db, &user, "2026-03-14T09", "2026-03-14", 5, 1)
                .await
                .unwrap(),
            BudgetCheck::DailyCapReached
        );
    }

    #[tokio::test]
    async fn zero_cap_is_unlimited() {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserId::from("u1");
        for _ in 0..100 {
            let check = increment_if_allowed(&db, &user, "h", "d", 0, 0).await.unwrap();
            assert!(matches!(check, BudgetCheck::Allowed { .. }));
        }
    }

    #[tokio::test]
    async fn refund_gives_back_one_alert() {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserId::from("u1");
        increment_if_allowed(&db, &user, "h1", "d1", 1, 1).await.unwrap();
        refund(&db, &user, "h1", "d1").await.unwrap();

        let budget = get_budget(&db, &user).await.unwrap().unwrap();
        assert_eq!(budget.hour_count, 0);
        assert_eq!(budget.day_count, 0);

        // Refunding again never goes negative.
        refund(&db, &user, "h1", "d1").await.unwrap();
        assert_eq!(get_budget(&db, &user).await.unwrap().unwrap().hour_count, 0);
    }
}
