// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retention/cleanup service.
//!
//! Bounds the growth of the slot-observation history and the scrape log.
//! An observation older than the retention window is deleted unless it
//! underlies a live alert record or still matches an active user's
//! preferences. Current snapshots are never touched. Work proceeds in
//! keyset-paginated batches, each its own transaction, so a run is safe to
//! interrupt and re-run.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use courtwatch_alerts::matches_any;
use courtwatch_config::model::RetentionConfig;
use courtwatch_core::{checked_before, Clock, CourtwatchError};
use courtwatch_storage::queries::{alerts, preferences, retention};
use courtwatch_storage::{Database, RetentionRunRecord};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Conditions worth an operator's attention. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetentionAnomaly {
    /// This many consecutive runs (including this one) deleted nothing.
    ConsecutiveZeroDeletions { runs: u32 },
    /// One run deleted more than the configured threshold.
    DeletionThresholdExceeded { deleted: u64, threshold: u64 },
}

impl fmt::Display for RetentionAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConsecutiveZeroDeletions { runs } => {
                write!(f, "{runs} consecutive runs deleted nothing")
            }
            Self::DeletionThresholdExceeded { deleted, threshold } => {
                write!(f, "deleted {deleted} records, above threshold {threshold}")
            }
        }
    }
}

/// Counts for one retention run. In dry-run mode the deletion counts are
/// what would have been deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub cutoff: DateTime<Utc>,
    pub active_preferences: usize,
    pub scanned: u64,
    pub retained_by_preference: u64,
    pub retained_by_alert: u64,
    pub deleted: u64,
    pub logs_deleted: u64,
    pub alerts_purged: u64,
    pub errors: u64,
    pub anomalies: Vec<RetentionAnomaly>,
}

impl RetentionReport {
    pub fn duration(&self) -> Duration {
        self.finished_at - self.started_at
    }

    fn to_record(&self) -> RetentionRunRecord {
        RetentionRunRecord {
            started_at: self.started_at,
            finished_at: self.finished_at,
            dry_run: self.dry_run,
            scanned: self.scanned,
            retained_by_preference: self.retained_by_preference,
            retained_by_alert: self.retained_by_alert,
            deleted: self.deleted,
            logs_deleted: self.logs_deleted,
            alerts_purged: self.alerts_purged,
            errors: self.errors,
            anomalies: self.anomalies.iter().map(ToString::to_string).collect(),
        }
    }
}

pub struct RetentionService {
    db: Database,
    clock: Arc<dyn Clock>,
    config: RetentionConfig,
}

impl RetentionService {
    pub fn new(db: Database, config: &RetentionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            config: config.clone(),
        }
    }

    /// Run with the configured dry-run setting.
    pub async fn run(&self) -> Result<RetentionReport, CourtwatchError> {
        self.run_with(self.config.dry_run).await
    }

    /// Run one retention cycle.
    ///
    /// Fails only if the active preferences cannot be loaded or the run
    /// cannot be recorded; per-batch failures are counted in `errors`.
    pub async fn run_with(&self, dry_run: bool) -> Result<RetentionReport, CourtwatchError> {
        let started_at = self.clock.now();
        let window = std::time::Duration::from_secs(u64::from(self.config.window_days) * 86_400);
        let cutoff = checked_before(started_at, window, "retention.window_days")?;
        let batch_size = self.config.batch_size.max(1);

        let users: Vec<_> = preferences::list_active_users(&self.db)
            .await?
            .into_iter()
            .filter(|u| u.is_alertable())
            .collect();
        info!(
            cutoff = %cutoff,
            batch_size,
            dry_run,
            active_preferences = users.len(),
            "retention run started"
        );

        let mut report = RetentionReport {
            started_at,
            finished_at: started_at,
            dry_run,
            cutoff,
            active_preferences: users.len(),
            scanned: 0,
            retained_by_preference: 0,
            retained_by_alert: 0,
            deleted: 0,
            logs_deleted: 0,
            alerts_purged: 0,
            errors: 0,
            anomalies: Vec::new(),
        };

        let mut after_id = 0;
        loop {
            let batch = match retention::observation_batch(
                &self.db, cutoff, after_id, batch_size, started_at,
            )
            .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, after_id, "failed to read retention batch, stopping scan");
                    report.errors += 1;
                    break;
                }
            };
            let Some(last) = batch.last() else { break };
            after_id = last.id;

            let mut doomed = Vec::new();
            for record in &batch {
                report.scanned += 1;
                if record.has_live_alert {
                    report.retained_by_alert += 1;
                    continue;
                }
                let (matched, errors) = matches_any(&users, &record.venue_name, &record.slot);
                report.errors += errors as u64;
                if matched {
                    report.retained_by_preference += 1;
                } else if errors > 0 {
                    // Could not evaluate every preference; keep it for the next run.
                    debug!(observation_id = record.id, "retained after preference error");
                } else {
                    doomed.push(record.id);
                }
            }

            if dry_run {
                report.deleted += doomed.len() as u64;
            } else {
                match retention::delete_observations(&self.db, doomed).await {
                    Ok(n) => report.deleted += n as u64,
                    Err(e) => {
                        warn!(error = %e, "failed to delete retention batch");
                        report.errors += 1;
                    }
                }
            }
            debug!(scanned = report.scanned, deleted = report.deleted, "retention batch done");

            if batch.len() < batch_size as usize {
                break;
            }
        }

        self.clean_scrape_logs(&mut report, cutoff, batch_size).await;
        self.purge_alert_records(&mut report, started_at, batch_size).await;

        if !dry_run {
            report.anomalies = self.detect_anomalies(&report).await;
        }
        for anomaly in &report.anomalies {
            warn!(anomaly = %anomaly, "retention anomaly");
        }

        report.finished_at = self.clock.now();
        retention::record_run(&self.db, &report.to_record()).await?;

        info!(
            scanned = report.scanned,
            retained_by_preference = report.retained_by_preference,
            retained_by_alert = report.retained_by_alert,
            deleted = report.deleted,
            logs_deleted = report.logs_deleted,
            alerts_purged = report.alerts_purged,
            errors = report.errors,
            dry_run,
            "retention run completed"
        );
        Ok(report)
    }

    async fn clean_scrape_logs(
        &self,
        report: &mut RetentionReport,
        cutoff: DateTime<Utc>,
        batch_size: u32,
    ) {
        if report.dry_run {
            match retention::count_scrape_logs_before(&self.db, cutoff).await {
                Ok(n) => report.logs_deleted = n,
                Err(e) => {
                    warn!(error = %e, "failed to count old scrape logs");
                    report.errors += 1;
                }
            }
            return;
        }
        loop {
            match retention::delete_scrape_logs_batch(&self.db, cutoff, batch_size).await {
                Ok(n) => {
                    report.logs_deleted += n as u64;
                    if n < batch_size as usize {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to delete scrape log batch");
                    report.errors += 1;
                    break;
                }
            }
        }
    }

    async fn purge_alert_records(
        &self,
        report: &mut RetentionReport,
        now: DateTime<Utc>,
        batch_size: u32,
    ) {
        if report.dry_run {
            match alerts::count_expired(&self.db, now).await {
                Ok(n) => report.alerts_purged = n,
                Err(e) => {
                    warn!(error = %e, "failed to count expired alert records");
                    report.errors += 1;
                }
            }
            return;
        }
        loop {
            match alerts::purge_expired(&self.db, now, batch_size).await {
                Ok(n) => {
                    report.alerts_purged += n as u64;
                    if n < batch_size as usize {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to purge expired alert records");
                    report.errors += 1;
                    break;
                }
            }
        }
    }

    async fn detect_anomalies(&self, report: &RetentionReport) -> Vec<RetentionAnomaly> {
        let mut anomalies = Vec::new();
        let deleted = report.deleted + report.logs_deleted;

        let threshold = self.config.max_deletions_alert;
        if threshold > 0 && deleted > threshold {
            anomalies.push(RetentionAnomaly::DeletionThresholdExceeded { deleted, threshold });
        }

        let runs = self.config.zero_deletion_alert_runs;
        if runs > 0 && deleted == 0 {
            let needed = runs - 1;
            match retention::recent_runs(&self.db, needed).await {
                Ok(previous) => {
                    let all_zero = previous
                        .iter()
                        .all(|r| r.deleted + r.logs_deleted == 0);
                    if previous.len() as u32 == needed && all_zero {
                        anomalies.push(RetentionAnomaly::ConsecutiveZeroDeletions { runs });
                    }
                }
                Err(e) => warn!(error = %e, "failed to read previous retention runs"),
            }
        }
        anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtwatch_core::{Snapshot, Slot, TaskId, UserId, VenueId};
    use courtwatch_storage::queries::{scrape_logs, snapshots, venues};
    use courtwatch_storage::ScrapeLogEntry;
    use courtwatch_test_utils::fixtures::{slot, user, venue};
    use courtwatch_test_utils::ManualClock;

    struct Fixture {
        db: Database,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        async fn new() -> Self {
            let db = Database::open_in_memory().await.unwrap();
            let clock = Arc::new(ManualClock::default());
            venues::upsert_venue(&db, &venue("v1"), clock.now()).await.unwrap();
            Self { db, clock }
        }

        fn service(&self, config: RetentionConfig) -> RetentionService {
            RetentionService::new(self.db.clone(), &config, self.clock.clone())
        }

        async fn observe(&self, days_ago: i64, slots: Vec<Slot>) {
            let snapshot = Snapshot {
                venue_id: VenueId::from("v1"),
                observed_at: self.clock.now() - Duration::days(days_ago),
                slots,
            };
            snapshots::replace_snapshot(&self.db, &snapshot).await.unwrap();
        }
    }

    #[tokio::test]
    async fn deletes_unmatched_old_records_and_keeps_alerted_ones() {
        let f = Fixture::new().await;
        let plain = slot("v1", "Court 1", 8, 15.0);
        let alerted = slot("v1", "Court 2", 8, 15.0);
        f.observe(10, vec![plain, alerted.clone()]).await;
        alerts::try_claim(
            &f.db,
            &UserId::from("u1"),
            &alerted.key.to_string(),
            f.clock.now() - Duration::days(1),
            f.clock.now() + Duration::days(6),
        )
        .await
        .unwrap();

        let report = f.service(RetentionConfig::default()).run().await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.retained_by_alert, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(snapshots::count_observations(&f.db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn keeps_records_matching_an_active_preference() {
        let f = Fixture::new().await;
        let mut wants_evenings = user("u1");
        wants_evenings.times = vec![courtwatch_test_utils::fixtures::range("18:00", "20:00")];
        preferences::upsert_user(&f.db, &wants_evenings, f.clock.now())
            .await
            .unwrap();
        f.observe(10, vec![slot("v1", "Court 1", 18, 15.0), slot("v1", "Court 1", 8, 15.0)])
            .await;

        let report = f.service(RetentionConfig::default()).run().await.unwrap();
        assert_eq!(report.active_preferences, 1);
        assert_eq!(report.retained_by_preference, 1);
        assert_eq!(report.deleted, 1);
    }

    #[tokio::test]
    async fn recent_records_are_not_candidates() {
        let f = Fixture::new().await;
        f.observe(3, vec![slot("v1", "Court 1", 8, 15.0)]).await;
        let report = f.service(RetentionConfig::default()).run().await.unwrap();
        assert_eq!(report.scanned, 0);
        assert_eq!(snapshots::count_observations(&f.db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dry_run_reports_without_deleting() {
        let f = Fixture::new().await;
        f.observe(10, vec![slot("v1", "Court 1", 8, 15.0)]).await;

        let report = f.service(RetentionConfig::default()).run_with(true).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.deleted, 1);
        assert!(report.anomalies.is_empty());
        assert_eq!(snapshots::count_observations(&f.db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn batches_cover_everything_and_rerun_is_idempotent() {
        let f = Fixture::new().await;
        for days in [12, 11, 10, 9, 8] {
            f.observe(days, vec![slot("v1", "Court 1", 8, 15.0), slot("v1", "Court 2", 8, 15.0)])
                .await;
        }
        let config = RetentionConfig {
            batch_size: 3,
            ..RetentionConfig::default()
        };

        let first = f.service(config.clone()).run().await.unwrap();
        assert_eq!(first.scanned, 10);
        assert_eq!(first.deleted, 10);

        let second = f.service(config).run().await.unwrap();
        assert_eq!(second.scanned, 0);
        assert_eq!(second.deleted, 0);
    }

    #[tokio::test]
    async fn old_scrape_logs_and_expired_alerts_are_purged() {
        let f = Fixture::new().await;
        for days in [30, 8, 1] {
            let at = f.clock.now() - Duration::days(days);
            scrape_logs::insert_log(
                &f.db,
                &ScrapeLogEntry {
                    venue_id: VenueId::from("v1"),
                    task_id: TaskId::generate(),
                    attempt: 1,
                    started_at: at,
                    finished_at: at,
                    success: true,
                    slot_count: 0,
                    error: None,
                },
            )
            .await
            .unwrap();
        }
        alerts::record_sent(
            &f.db,
            &UserId::from("u1"),
            "v1:old",
            f.clock.now() - Duration::days(9),
            f.clock.now() - Duration::days(2),
        )
        .await
        .unwrap();

        let report = f.service(RetentionConfig::default()).run().await.unwrap();
        assert_eq!(report.logs_deleted, 2);
        assert_eq!(report.alerts_purged, 1);
    }

    #[tokio::test]
    async fn flags_consecutive_empty_runs() {
        let f = Fixture::new().await;
        let service = f.service(RetentionConfig {
            zero_deletion_alert_runs: 3,
            ..RetentionConfig::default()
        });

        for _ in 0..2 {
            assert!(service.run().await.unwrap().anomalies.is_empty());
            f.clock.advance(Duration::days(1));
        }
        let third = service.run().await.unwrap();
        assert_eq!(
            third.anomalies,
            vec![RetentionAnomaly::ConsecutiveZeroDeletions { runs: 3 }]
        );
    }

    #[tokio::test]
    async fn flags_deletions_above_threshold() {
        let f = Fixture::new().await;
        f.observe(10, vec![slot("v1", "Court 1", 8, 15.0), slot("v1", "Court 2", 8, 15.0)])
            .await;
        let service = f.service(RetentionConfig {
            max_deletions_alert: 1,
            ..RetentionConfig::default()
        });

        let report = service.run().await.unwrap();
        assert_eq!(
            report.anomalies,
            vec![RetentionAnomaly::DeletionThresholdExceeded {
                deleted: 2,
                threshold: 1
            }]
        );
    }

    #[tokio::test]
    async fn unrepresentable_window_fails_before_touching_rows() {
        let f = Fixture::new().await;
        f.observe(10, vec![slot("v1", "Court 1", 8, 15.0)]).await;
        let config = RetentionConfig {
            window_days: u32::MAX,
            ..RetentionConfig::default()
        };

        let err = f.service(config).run().await.unwrap_err();
        assert!(matches!(err, CourtwatchError::Config(ref m) if m.contains("window_days")));
        assert_eq!(snapshots::count_observations(&f.db).await.unwrap(), 1);
        assert!(retention::recent_runs(&f.db, 1).await.unwrap().is_empty());
    }
}
