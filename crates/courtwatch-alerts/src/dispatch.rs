// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert dispatch: change events in, notifications out.
//!
//! Each (event, user) pair is an independent unit of work. A failure in one
//! unit is recorded in the report and never stops the others.

use std::collections::HashMap;
use std::sync::Arc;

use courtwatch_config::model::AlertsConfig;
use courtwatch_core::{
    Alert, ChangeEvent, ChangeKind, CourtwatchError, Notifier, UserId, UserPreferences, Venue,
    VenueId,
};
use courtwatch_storage::queries::{preferences, venues};
use courtwatch_storage::Database;
use strum::Display;
use tracing::{debug, info, warn};

use crate::dedup::DedupLedger;
use crate::matcher::match_slot;
use crate::rate_limit::{RateDecision, RateLimiter};

/// What happened to one (event, user) unit. Everything except the last
/// two variants is an expected outcome.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DispatchOutcome {
    Sent,
    NotMatched,
    /// A live alert record already covers this user and slot.
    AlreadyAlerted,
    /// A concurrent dispatch claimed the alert first.
    DedupRaceLost,
    RateLimited,
    QuietHours,
    Unsubscribed,
    InstantAlertsOff,
    /// The notifier failed after the alert was claimed. Not retried.
    NotifyFailed(String),
    /// Matching or bookkeeping failed for this unit.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecord {
    pub user_id: UserId,
    pub slot_key: String,
    pub kind: ChangeKind,
    pub outcome: DispatchOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Events that were eligible for alerting.
    pub candidates: usize,
    pub records: Vec<DispatchRecord>,
}

impl DispatchReport {
    pub fn count(&self, pred: impl Fn(&DispatchOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn sent(&self) -> usize {
        self.count(|o| *o == DispatchOutcome::Sent)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::NotifyFailed(_) | DispatchOutcome::Failed(_)))
    }
}

pub struct AlertDispatcher {
    db: Database,
    ledger: DedupLedger,
    limiter: RateLimiter,
    notifier: Arc<dyn Notifier>,
    notify_price_drops: bool,
}

impl AlertDispatcher {
    pub fn new(
        db: Database,
        ledger: DedupLedger,
        limiter: RateLimiter,
        notifier: Arc<dyn Notifier>,
        config: &AlertsConfig,
    ) -> Self {
        Self {
            db,
            ledger,
            limiter,
            notifier,
            notify_price_drops: config.notify_price_drops,
        }
    }

    /// Only appearances, and price drops when enabled, are alertable.
    /// Disappearances are logged and dropped here.
    pub fn is_candidate(&self, event: &ChangeEvent) -> bool {
        match event.kind {
            ChangeKind::Appeared => true,
            ChangeKind::PriceChanged => {
                self.notify_price_drops
                    && event.previous_price.is_some_and(|prev| event.slot.price < prev)
            }
            ChangeKind::Disappeared => false,
        }
    }

    /// Fan candidate events out to every active user.
    ///
    /// Errors only when the user or venue lists cannot be loaded at all;
    /// per-unit failures are reported in [`DispatchReport::records`].
    pub async fn dispatch(&self, events: &[ChangeEvent]) -> Result<DispatchReport, CourtwatchError> {
        let mut report = DispatchReport::default();
        let candidates: Vec<&ChangeEvent> = events
            .iter()
            .filter(|e| {
                let keep = self.is_candidate(e);
                if !keep {
                    debug!(slot_key = %e.slot.key, kind = %e.kind, "change not alertable");
                }
                keep
            })
            .collect();
        report.candidates = candidates.len();
        if candidates.is_empty() {
            return Ok(report);
        }

        let users = preferences::list_active_users(&self.db).await?;
        let mut venue_cache: HashMap<VenueId, Venue> = HashMap::new();

        for event in candidates {
            let venue = match venue_cache.get(&event.venue_id) {
                Some(v) => v.clone(),
                None => {
                    let Some(v) = venues::get_venue(&self.db, &event.venue_id).await? else {
                        warn!(venue_id = %event.venue_id, "event for unknown venue skipped");
                        continue;
                    };
                    venue_cache.insert(event.venue_id.clone(), v.clone());
                    v
                }
            };

            let slot_key = event.slot.key.to_string();
            for prefs in &users {
                let outcome = self.dispatch_one(event, &venue, &slot_key, prefs).await;
                match &outcome {
                    DispatchOutcome::Sent => info!(
                        user_id = %prefs.user_id,
                        slot_key = %slot_key,
                        kind = %event.kind,
                        "alert sent"
                    ),
                    DispatchOutcome::NotifyFailed(e) | DispatchOutcome::Failed(e) => warn!(
                        user_id = %prefs.user_id,
                        slot_key = %slot_key,
                        error = %e,
                        "alert unit failed"
                    ),
                    DispatchOutcome::NotMatched => {}
                    other => debug!(
                        user_id = %prefs.user_id,
                        slot_key = %slot_key,
                        outcome = %other,
                        "alert suppressed"
                    ),
                }
                report.records.push(DispatchRecord {
                    user_id: prefs.user_id.clone(),
                    slot_key: slot_key.clone(),
                    kind: event.kind,
                    outcome,
                });
            }
        }
        Ok(report)
    }

    async fn dispatch_one(
        &self,
        event: &ChangeEvent,
        venue: &Venue,
        slot_key: &str,
        prefs: &UserPreferences,
    ) -> DispatchOutcome {
        match self.try_dispatch(event, venue, slot_key, prefs).await {
            Ok(outcome) => outcome,
            Err(e) => DispatchOutcome::Failed(e.to_string()),
        }
    }

    async fn try_dispatch(
        &self,
        event: &ChangeEvent,
        venue: &Venue,
        slot_key: &str,
        prefs: &UserPreferences,
    ) -> Result<DispatchOutcome, CourtwatchError> {
        let Some(reason) = match_slot(prefs, &venue.name, &event.slot)? else {
            return Ok(DispatchOutcome::NotMatched);
        };

        // Cheap early exit; the claim below is what actually enforces dedup.
        if !self.ledger.should_alert(&prefs.user_id, slot_key).await? {
            return Ok(DispatchOutcome::AlreadyAlerted);
        }

        let budget = match self.limiter.allow(prefs).await? {
            RateDecision::Allowed(slot) => slot,
            RateDecision::Unsubscribed => return Ok(DispatchOutcome::Unsubscribed),
            RateDecision::InstantAlertsOff => return Ok(DispatchOutcome::InstantAlertsOff),
            RateDecision::QuietHours => return Ok(DispatchOutcome::QuietHours),
            RateDecision::HourlyCapReached | RateDecision::DailyCapReached => {
                return Ok(DispatchOutcome::RateLimited);
            }
        };

        if !self.ledger.try_claim(&prefs.user_id, slot_key).await? {
            self.limiter.refund(&prefs.user_id, &budget).await?;
            return Ok(DispatchOutcome::DedupRaceLost);
        }

        let alert = Alert {
            user_id: prefs.user_id.clone(),
            email: prefs.email.clone(),
            venue_name: venue.name.clone(),
            booking_url: venue.url.clone(),
            slot: event.slot.clone(),
            kind: event.kind,
            previous_price: event.previous_price,
            reason,
        };
        // The claim stands even if delivery fails.
        match self.notifier.notify(&alert).await {
            Ok(()) => Ok(DispatchOutcome::Sent),
            Err(e) => Ok(DispatchOutcome::NotifyFailed(e.to_string())),
        }
    }
}
