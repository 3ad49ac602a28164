// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deduplication ledger: at most one alert per (user, slot key) per window.
//!
//! [`DedupLedger::try_claim`] is the only check the dispatch path relies on;
//! it is a single conditional insert, so two concurrent dispatchers racing
//! on the same pair cannot both win. `should_alert` is an advisory read for
//! skipping work early.

use std::sync::Arc;

use std::time::Duration;

use chrono::{DateTime, Utc};
use courtwatch_config::model::AlertsConfig;
use courtwatch_core::{checked_after, AlertRecord, Clock, CourtwatchError, UserId};
use courtwatch_storage::queries::alerts;
use courtwatch_storage::Database;
use tracing::debug;

#[derive(Clone)]
pub struct DedupLedger {
    db: Database,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl DedupLedger {
    pub fn new(db: Database, config: &AlertsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            ttl: Duration::from_secs(config.dedup_ttl_hours.saturating_mul(3600)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn expiry(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, CourtwatchError> {
        checked_after(now, self.ttl, "alerts.dedup_ttl_hours")
    }

    /// `true` unless a live record exists for the pair.
    pub async fn should_alert(
        &self,
        user_id: &UserId,
        slot_key: &str,
    ) -> Result<bool, CourtwatchError> {
        let live = alerts::find_live(&self.db, user_id, slot_key, self.clock.now()).await?;
        Ok(live.is_none())
    }

    /// Create or overwrite the record for the pair, expiring one TTL from now.
    pub async fn record_sent(&self, user_id: &UserId, slot_key: &str) -> Result<(), CourtwatchError> {
        let now = self.clock.now();
        alerts::record_sent(&self.db, user_id, slot_key, now, self.expiry(now)?).await
    }

    /// Atomically record the pair unless a live record already exists.
    ///
    /// `false` means another dispatch already owns this alert.
    pub async fn try_claim(&self, user_id: &UserId, slot_key: &str) -> Result<bool, CourtwatchError> {
        let now = self.clock.now();
        let claimed = alerts::try_claim(&self.db, user_id, slot_key, now, self.expiry(now)?).await?;
        if !claimed {
            debug!(user_id = %user_id, slot_key, "dedup claim lost");
        }
        Ok(claimed)
    }

    pub async fn find_live(
        &self,
        user_id: &UserId,
        slot_key: &str,
    ) -> Result<Option<AlertRecord>, CourtwatchError> {
        alerts::find_live(&self.db, user_id, slot_key, self.clock.now()).await
    }

    /// Delete up to `limit` expired records. Returns how many were removed.
    pub async fn purge_expired(&self, limit: u32) -> Result<usize, CourtwatchError> {
        alerts::purge_expired(&self.db, self.clock.now(), limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use courtwatch_test_utils::ManualClock;

    const KEY: &str = "v1:2026-03-14:18:00-19:00:Court 1";

    async fn ledger() -> (DedupLedger, Arc<ManualClock>) {
        let db = Database::open_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::default());
        (DedupLedger::new(db, &AlertsConfig::default(), clock.clone()), clock)
    }

    #[tokio::test]
    async fn record_suppresses_for_seven_days() {
        let (ledger, clock) = ledger().await;
        let user = UserId::from("u1");
        assert!(ledger.should_alert(&user, KEY).await.unwrap());

        ledger.record_sent(&user, KEY).await.unwrap();
        assert!(!ledger.should_alert(&user, KEY).await.unwrap());

        clock.advance(Duration::days(7) - Duration::seconds(1));
        assert!(!ledger.should_alert(&user, KEY).await.unwrap());

        clock.advance(Duration::seconds(1));
        assert!(ledger.should_alert(&user, KEY).await.unwrap());
    }

    #[tokio::test]
    async fn claim_wins_once_then_rearms_after_expiry() {
        let (ledger, clock) = ledger().await;
        let user = UserId::from("u1");
        assert!(ledger.try_claim(&user, KEY).await.unwrap());
        assert!(!ledger.try_claim(&user, KEY).await.unwrap());

        clock.advance(Duration::days(8));
        assert!(ledger.try_claim(&user, KEY).await.unwrap());
        let record = ledger.find_live(&user, KEY).await.unwrap().unwrap();
        assert_eq!(record.send_count, 2);
    }

    #[tokio::test]
    async fn ttl_follows_config() {
        let db = Database::open_in_memory().await.unwrap();
        let config = AlertsConfig {
            dedup_ttl_hours: 1,
            ..AlertsConfig::default()
        };
        let clock = Arc::new(ManualClock::default());
        let ledger = DedupLedger::new(db, &config, clock.clone());
        let user = UserId::from("u1");

        ledger.record_sent(&user, KEY).await.unwrap();
        clock.advance(Duration::minutes(61));
        assert!(ledger.should_alert(&user, KEY).await.unwrap());
        assert_eq!(ledger.purge_expired(100).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unrepresentable_ttl_is_config_error() {
        let db = Database::open_in_memory().await.unwrap();
        let config = AlertsConfig {
            dedup_ttl_hours: u64::MAX,
            ..AlertsConfig::default()
        };
        let ledger = DedupLedger::new(db, &config, Arc::new(ManualClock::default()));
        let user = UserId::from("u1");

        let err = ledger.try_claim(&user, KEY).await.unwrap_err();
        assert!(matches!(err, CourtwatchError::Config(ref m) if m.contains("dedup_ttl_hours")));
        assert!(ledger.record_sent(&user, KEY).await.is_err());
        assert!(ledger.should_alert(&user, KEY).await.unwrap());
    }
}
