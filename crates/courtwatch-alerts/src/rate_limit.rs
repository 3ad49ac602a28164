// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user alert volume caps and delivery windows.
//!
//! Counters reset at calendar boundaries (top of the hour, midnight UTC)
//! rather than sliding. The check and increment happen in one store
//! transaction, so concurrent dispatchers cannot overshoot a cap.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use courtwatch_core::{Clock, CourtwatchError, NotificationSettings, UserId, UserPreferences};
use courtwatch_storage::queries::budgets;
use courtwatch_storage::{BudgetCheck, Database};
use strum::Display;
use tracing::debug;

use crate::matcher::parse_hhmm;

/// Counter buckets charged by an allowed alert, needed to refund it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetSlot {
    pub hour_bucket: String,
    pub day_bucket: String,
}

impl BudgetSlot {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            hour_bucket: now.format("%Y-%m-%dT%H").to_string(),
            day_bucket: now.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Verdict of [`RateLimiter::allow`]. Only `Allowed` consumed budget.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RateDecision {
    Allowed(BudgetSlot),
    /// Unsubscribed or deactivated.
    Unsubscribed,
    InstantAlertsOff,
    /// Outside the user's alert time window.
    QuietHours,
    HourlyCapReached,
    DailyCapReached,
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Decide whether `prefs.user_id` may receive one more alert now, and
    /// if so charge it against the hourly and daily counters.
    ///
    /// Denials are expected outcomes, not errors. An error means the
    /// user's window could not be parsed or the store failed.
    pub async fn allow(&self, prefs: &UserPreferences) -> Result<RateDecision, CourtwatchError> {
        let settings = &prefs.notifications;
        if !prefs.is_alertable() {
            return Ok(RateDecision::Unsubscribed);
        }
        if !settings.instant_alerts {
            return Ok(RateDecision::InstantAlertsOff);
        }

        let now = self.clock.now();
        if !within_alert_window(settings, now)? {
            debug!(user_id = %prefs.user_id, "outside alert window");
            return Ok(RateDecision::QuietHours);
        }

        let slot = BudgetSlot::at(now);
        let check = budgets::increment_if_allowed(
            &self.db,
            &prefs.user_id,
            &slot.hour_bucket,
            &slot.day_bucket,
            settings.max_alerts_per_hour,
            settings.max_alerts_per_day,
        )
        .await?;

        Ok(match check {
            BudgetCheck::Allowed { .. } => RateDecision::Allowed(slot),
            BudgetCheck::HourlyCapReached => RateDecision::HourlyCapReached,
            BudgetCheck::DailyCapReached => RateDecision::DailyCapReached,
        })
    }

    /// Give back budget charged by an `Allowed` decision whose alert was
    /// never sent (for example, the dedup claim was lost).
    pub async fn refund(&self, user_id: &UserId, slot: &BudgetSlot) -> Result<(), CourtwatchError> {
        budgets::refund(&self.db, user_id, &slot.hour_bucket, &slot.day_bucket).await
    }
}

/// Whether `now` (UTC, minute precision) falls inside the inclusive
/// `[start, end]` window. Windows with `start > end` wrap midnight; a
/// missing or empty bound means no restriction.
pub fn within_alert_window(
    settings: &NotificationSettings,
    now: DateTime<Utc>,
) -> Result<bool, CourtwatchError> {
    let bound = |raw: &Option<String>| match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_hhmm(s).map(Some),
    };
    let (Some(start), Some(end)) = (
        bound(&settings.alert_time_window_start)?,
        bound(&settings.alert_time_window_end)?,
    ) else {
        return Ok(true);
    };

    let t = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or(start);
    Ok(if start <= end {
        start <= t && t <= end
    } else {
        t >= start || t <= end
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use courtwatch_test_utils::fixtures::user;
    use courtwatch_test_utils::ManualClock;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, 30).unwrap()
    }

    fn window(start: &str, end: &str) -> NotificationSettings {
        NotificationSettings {
            alert_time_window_start: Some(start.into()),
            alert_time_window_end: Some(end.into()),
            ..NotificationSettings::default()
        }
    }

    #[test]
    fn daytime_window_is_inclusive() {
        let s = window("07:00", "22:00");
        assert!(within_alert_window(&s, at(7, 0)).unwrap());
        assert!(within_alert_window(&s, at(22, 0)).unwrap());
        assert!(!within_alert_window(&s, at(22, 1)).unwrap());
        assert!(!within_alert_window(&s, at(6, 59)).unwrap());
    }

    #[test]
    fn window_may_wrap_midnight() {
        let s = window("22:00", "07:00");
        assert!(within_alert_window(&s, at(23, 30)).unwrap());
        assert!(within_alert_window(&s, at(3, 0)).unwrap());
        assert!(!within_alert_window(&s, at(12, 0)).unwrap());
    }

    #[test]
    fn empty_bound_means_unrestricted() {
        assert!(within_alert_window(&window("", "07:00"), at(12, 0)).unwrap());
        let open = NotificationSettings {
            alert_time_window_start: None,
            ..NotificationSettings::default()
        };
        assert!(within_alert_window(&open, at(3, 0)).unwrap());
    }

    #[test]
    fn garbage_bound_is_an_error() {
        assert!(within_alert_window(&window("7am", "22:00"), at(12, 0)).is_err());
    }

    async fn limiter() -> (RateLimiter, Arc<ManualClock>) {
        let db = Database::open_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(at(10, 0)));
        (RateLimiter::new(db, clock.clone()), clock)
    }

    #[tokio::test]
    async fn hourly_cap_resets_at_the_top_of_the_hour() {
        let (limiter, clock) = limiter().await;
        let mut prefs = user("u1");
        prefs.notifications.max_alerts_per_hour = 2;

        assert!(limiter.allow(&prefs).await.unwrap().is_allowed());
        assert!(limiter.allow(&prefs).await.unwrap().is_allowed());
        assert_eq!(limiter.allow(&prefs).await.unwrap(), RateDecision::HourlyCapReached);

        clock.set(at(11, 0));
        assert!(limiter.allow(&prefs).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn daily_cap_spans_hours() {
        let (limiter, clock) = limiter().await;
        let mut prefs = user("u1");
        prefs.notifications.max_alerts_per_hour = 0;
        prefs.notifications.max_alerts_per_day = 2;

        assert!(limiter.allow(&prefs).await.unwrap().is_allowed());
        clock.advance(Duration::hours(1));
        assert!(limiter.allow(&prefs).await.unwrap().is_allowed());
        clock.advance(Duration::hours(1));
        assert_eq!(limiter.allow(&prefs).await.unwrap(), RateDecision::DailyCapReached);

        clock.set(Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap());
        assert!(limiter.allow(&prefs).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn refund_returns_the_slot() {
        let (limiter, _clock) = limiter().await;
        let mut prefs = user("u1");
        prefs.notifications.max_alerts_per_hour = 1;

        let RateDecision::Allowed(slot) = limiter.allow(&prefs).await.unwrap() else {
            panic!("expected allowance");
        };
        limiter.refund(&prefs.user_id, &slot).await.unwrap();
        assert!(limiter.allow(&prefs).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn settings_gate_before_counters() {
        let (limiter, _clock) = limiter().await;
        let mut prefs = user("u1");
        prefs.notifications.unsubscribed = true;
        assert_eq!(limiter.allow(&prefs).await.unwrap(), RateDecision::Unsubscribed);

        let mut prefs = user("u1");
        prefs.notifications.instant_alerts = false;
        assert_eq!(limiter.allow(&prefs).await.unwrap(), RateDecision::InstantAlertsOff);

        let mut prefs = user("u1");
        prefs.notifications.alert_time_window_start = Some("18:00".into());
        prefs.notifications.alert_time_window_end = Some("21:00".into());
        assert_eq!(limiter.allow(&prefs).await.unwrap(), RateDecision::QuietHours);
    }
}
