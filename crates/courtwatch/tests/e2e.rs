// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end integration tests for the complete Courtwatch pipeline.
//!
//! Each test creates an isolated TestHarness with a temp SQLite database,
//! a scripted scraper, a recording notifier and a manual clock. Tests are
//! independent and order-insensitive.

use chrono::Duration;
use courtwatch_agent::WorkOutcome;
use courtwatch_core::{ChangeKind, ScrapeError, VenueId};
use courtwatch_storage::queries::{scrape_logs, snapshots};
use courtwatch_storage::{FailOutcome, RequeueOutcome};
use courtwatch_test_utils::TestHarness;
use courtwatch_test_utils::fixtures::slot;

const CONFIG: &str = r#"
[[venues]]
id = "victoria-park"
name = "Victoria Park"
url = "https://victoria.example.org/book"

[[users]]
id = "alice"
email = "alice@example.com"
max_price = 20.0

[[users]]
id = "bob"
email = "bob@example.com"
excluded_venues = ["victoria-park"]
"#;

fn victoria() -> VenueId {
    VenueId::from("victoria-park")
}

async fn harness() -> TestHarness {
    TestHarness::builder()
        .with_config_toml(CONFIG)
        .build()
        .await
        .unwrap()
}

// ---- Test 1: Appearance alerts matching users exactly once ----

#[tokio::test]
async fn test_new_slot_alerts_matching_user_once() {
    let h = harness().await;
    h.scraper
        .set_slots(&victoria(), vec![slot("victoria-park", "Court 1", 18, 15.0)])
        .await;

    let outcomes = h.cycle().await.unwrap();
    assert!(matches!(
        outcomes.as_slice(),
        [WorkOutcome::Completed { slots: 1, events: 1, alerts_sent: 1, stale: false, .. }]
    ));

    let sent = h.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id.as_str(), "alice");
    assert_eq!(sent[0].kind, ChangeKind::Appeared);
    assert_eq!(sent[0].venue_name, "Victoria Park");
    assert!(sent[0].reason.contains("within budget"));
}

#[tokio::test]
async fn test_unchanged_snapshot_sends_nothing_new() {
    let h = harness().await;
    h.scraper
        .set_slots(&victoria(), vec![slot("victoria-park", "Court 1", 18, 15.0)])
        .await;
    h.cycle().await.unwrap();

    h.advance(Duration::minutes(5));
    let outcomes = h.cycle().await.unwrap();
    assert!(matches!(
        outcomes.as_slice(),
        [WorkOutcome::Completed { events: 0, alerts_sent: 0, .. }]
    ));
    assert_eq!(h.notifier.sent_count().await, 1);
}

// ---- Test 2: Deduplication across disappear/reappear ----

#[tokio::test]
async fn test_reappearing_slot_is_deduplicated_within_ttl() {
    let h = harness().await;
    let court = slot("victoria-park", "Court 1", 18, 15.0);
    h.scraper.set_slots(&victoria(), vec![court.clone()]).await;
    h.cycle().await.unwrap();

    h.scraper.set_slots(&victoria(), Vec::new()).await;
    h.advance(Duration::minutes(5));
    h.cycle().await.unwrap();

    h.scraper.set_slots(&victoria(), vec![court]).await;
    h.advance(Duration::minutes(5));
    let outcomes = h.cycle().await.unwrap();
    assert!(matches!(
        outcomes.as_slice(),
        [WorkOutcome::Completed { events: 1, alerts_sent: 0, .. }]
    ));
    assert_eq!(h.notifier.sent_count().await, 1);
}

#[tokio::test]
async fn test_slot_alerts_again_after_dedup_ttl() {
    let h = TestHarness::builder()
        .with_config_toml(&format!("{CONFIG}\n[alerts]\ndedup_ttl_hours = 1\n"))
        .build()
        .await
        .unwrap();
    let court = slot("victoria-park", "Court 1", 18, 15.0);
    h.scraper.set_slots(&victoria(), vec![court.clone()]).await;
    h.cycle().await.unwrap();

    h.scraper.set_slots(&victoria(), Vec::new()).await;
    h.advance(Duration::minutes(5));
    h.cycle().await.unwrap();

    h.scraper.set_slots(&victoria(), vec![court]).await;
    h.advance(Duration::hours(2));
    h.cycle().await.unwrap();
    assert_eq!(h.notifier.sent_count().await, 2);
}

// ---- Test 3: Price drops ----

#[tokio::test]
async fn test_price_drop_into_budget_alerts() {
    let h = harness().await;
    h.scraper
        .set_slots(&victoria(), vec![slot("victoria-park", "Court 1", 18, 30.0)])
        .await;
    h.cycle().await.unwrap();
    assert_eq!(h.notifier.sent_count().await, 0);

    h.scraper
        .set_slots(&victoria(), vec![slot("victoria-park", "Court 1", 18, 18.0)])
        .await;
    h.advance(Duration::minutes(5));
    h.cycle().await.unwrap();

    let sent = h.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, ChangeKind::PriceChanged);
    assert_eq!(sent[0].previous_price, Some(30.0));
}

// ---- Test 4: Rate caps ----

#[tokio::test]
async fn test_hourly_cap_limits_alerts() {
    let h = TestHarness::builder()
        .with_config_toml(
            r#"
[[venues]]
id = "victoria-park"
name = "Victoria Park"
url = "https://victoria.example.org/book"

[[users]]
id = "alice"
email = "alice@example.com"

[users.notifications]
max_alerts_per_hour = 2
"#,
        )
        .build()
        .await
        .unwrap();
    let slots = (17..21)
        .map(|hour| slot("victoria-park", "Court 1", hour, 15.0))
        .collect();
    h.scraper.set_slots(&victoria(), slots).await;

    let outcomes = h.cycle().await.unwrap();
    assert!(matches!(
        outcomes.as_slice(),
        [WorkOutcome::Completed { events: 4, alerts_sent: 2, .. }]
    ));
    assert_eq!(h.notifier.sent_count().await, 2);

    // The suppressed slots never re-fire on an unchanged snapshot.
    h.advance(Duration::minutes(61));
    h.cycle().await.unwrap();
    assert_eq!(h.notifier.sent_count().await, 2);
}

// ---- Test 5: Retry and dead-letter ----

#[tokio::test]
async fn test_transient_failure_retries_after_backoff() {
    let h = harness().await;
    h.scraper
        .push(&victoria(), Err(ScrapeError::Transient("HTTP 503".into())))
        .await;
    h.scraper
        .set_slots(&victoria(), vec![slot("victoria-park", "Court 1", 18, 15.0)])
        .await;

    let outcomes = h.cycle().await.unwrap();
    assert!(matches!(
        outcomes.as_slice(),
        [WorkOutcome::Failed { outcome: FailOutcome::Retrying { attempts: 1, .. }, .. }]
    ));

    // Single-flight: the retrying task blocks a second enqueue.
    h.advance(Duration::minutes(5));
    let tick = h.tick().await.unwrap();
    assert!(tick.enqueued.is_empty());
    assert_eq!(tick.outstanding, 1);

    let outcomes = h.drain().await.unwrap();
    assert!(matches!(outcomes.as_slice(), [WorkOutcome::Completed { alerts_sent: 1, .. }]));
    assert_eq!(h.scraper.call_count().await, 2);

    let logs = scrape_logs::recent_logs(&h.db, Some(&victoria()), 10).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().any(|l| !l.success));
}

#[tokio::test]
async fn test_exhausted_retries_dead_letter_and_requeue() {
    let h = TestHarness::builder()
        .with_config_toml(&format!("{CONFIG}\n[queue]\nmax_attempts = 2\n"))
        .build()
        .await
        .unwrap();
    for _ in 0..2 {
        h.scraper
            .push(&victoria(), Err(ScrapeError::Transient("timeout".into())))
            .await;
    }

    h.cycle().await.unwrap();
    h.advance(Duration::minutes(5));
    let outcomes = h.drain().await.unwrap();
    assert!(matches!(
        outcomes.as_slice(),
        [WorkOutcome::Failed { outcome: FailOutcome::DeadLettered { attempts: 2 }, .. }]
    ));

    let dead = h.queue().dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].venue_id, victoria());
    assert!(dead[0].last_error.as_deref().unwrap_or("").contains("timeout"));
    assert_eq!(h.scheduler().status().await.unwrap().dead_letters(), 1);

    let outcome = h.queue().requeue_dead_letter(&dead[0].id).await.unwrap();
    assert_eq!(outcome, RequeueOutcome::Requeued);
    let outcomes = h.drain().await.unwrap();
    assert!(matches!(outcomes.as_slice(), [WorkOutcome::Completed { .. }]));
    assert!(h.queue().dead_letters().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_permanent_failure_dead_letters_immediately() {
    let h = harness().await;
    h.scraper
        .push(&victoria(), Err(ScrapeError::Permanent("login required".into())))
        .await;

    let outcomes = h.cycle().await.unwrap();
    assert!(matches!(
        outcomes.as_slice(),
        [WorkOutcome::Failed { outcome: FailOutcome::DeadLettered { attempts: 1 }, .. }]
    ));
    assert_eq!(h.queue().depth().await.unwrap().dead_letter, 1);
}

// ---- Test 6: Operator pause ----

#[tokio::test]
async fn test_pause_stops_enqueueing_until_resume() {
    let h = harness().await;
    h.scheduler().pause().await.unwrap();

    let tick = h.tick().await.unwrap();
    assert!(tick.paused);
    assert!(h.drain().await.unwrap().is_empty());
    assert_eq!(h.scraper.call_count().await, 0);

    h.scheduler().resume().await.unwrap();
    h.cycle().await.unwrap();
    assert_eq!(h.scraper.call_count().await, 1);
}

// ---- Test 7: Retention ----

#[tokio::test]
async fn test_retention_keeps_matching_history_and_current_snapshot() {
    let h = harness().await;
    h.scraper
        .set_slots(
            &victoria(),
            vec![
                slot("victoria-park", "Court 1", 18, 15.0),
                slot("victoria-park", "Court 2", 18, 35.0),
            ],
        )
        .await;
    h.cycle().await.unwrap();

    h.advance(Duration::days(8));
    let report = h.retention().run().await.unwrap();
    assert!(!report.dry_run);
    assert_eq!(report.scanned, 2);
    assert_eq!(report.retained_by_preference, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.logs_deleted, 1);
    assert_eq!(report.alerts_purged, 1);
    assert_eq!(report.errors, 0);

    let current = snapshots::load_snapshot(&h.db, &victoria()).await.unwrap().unwrap();
    assert_eq!(current.slots.len(), 2);
}

#[tokio::test]
async fn test_retention_dry_run_deletes_nothing() {
    let h = harness().await;
    h.scraper
        .set_slots(&victoria(), vec![slot("victoria-park", "Court 2", 18, 35.0)])
        .await;
    h.cycle().await.unwrap();

    h.advance(Duration::days(8));
    let first = h.retention().run_with(true).await.unwrap();
    assert_eq!(first.deleted, 1);
    let second = h.retention().run_with(true).await.unwrap();
    assert_eq!(second.deleted, 1);
    assert_eq!(snapshots::count_observations(&h.db).await.unwrap(), 1);
}
