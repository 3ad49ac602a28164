// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Snapshot diffing and the change detector.
//!
//! Only available slots take part in the diff: a slot that flips to
//! unavailable is reported as `Disappeared`, and one that flips back as
//! `Appeared`. Events are ordered by slot key, so the same pair of
//! snapshots always yields the same event list.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use courtwatch_core::{
    prices_differ, ChangeEvent, ChangeKind, CourtwatchError, Slot, SlotKey, Snapshot,
    VenueId,
};
use courtwatch_storage::queries::snapshots;
use courtwatch_storage::{Database, SnapshotSwap};
use tracing::{debug, warn};

/// Compare two slot sets of the same venue.
///
/// Keys only in `new` are `Appeared`, keys only in `old` are `Disappeared`,
/// keys in both whose price moved are `PriceChanged`. Duplicate keys within
/// one set collapse to the last occurrence.
pub fn diff_snapshots(
    venue_id: &VenueId,
    old: &[Slot],
    new: &[Slot],
    observed_at: DateTime<Utc>,
) -> Vec<ChangeEvent> {
    let old = available_by_key(old);
    let new = available_by_key(new);
    let event = |slot: &Slot, kind, previous_price| ChangeEvent {
        venue_id: venue_id.clone(),
        slot: slot.clone(),
        kind,
        previous_price,
        observed_at,
    };

    let mut events = Vec::new();
    for (key, slot) in &new {
        match old.get(key) {
            None => events.push(event(slot, ChangeKind::Appeared, None)),
            Some(prev) if prices_differ(prev.price, slot.price) => {
                events.push(event(slot, ChangeKind::PriceChanged, Some(prev.price)));
            }
            Some(_) => {}
        }
    }
    for (key, slot) in &old {
        if !new.contains_key(key) {
            events.push(event(slot, ChangeKind::Disappeared, None));
        }
    }
    events.sort_by(|a, b| a.slot.key.cmp(&b.slot.key));
    events
}

fn available_by_key(slots: &[Slot]) -> BTreeMap<&SlotKey, &Slot> {
    slots
        .iter()
        .filter(|s| s.available)
        .map(|s| (&s.key, s))
        .collect()
}

/// Outcome of applying one scrape result.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub venue_id: VenueId,
    pub observed_at: DateTime<Utc>,
    pub events: Vec<ChangeEvent>,
    /// A newer snapshot was already stored; this result was discarded.
    pub stale: bool,
}

impl DetectionResult {
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

/// Converts scrape results into change events and keeps the snapshot store current.
#[derive(Clone)]
pub struct ChangeDetector {
    db: Database,
}

impl ChangeDetector {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store `slots` as the venue's current snapshot and return what changed.
    ///
    /// `observed_at` is when the scrape started. The replace is a
    /// compare-and-swap on it and the diff is taken against exactly the
    /// snapshot it replaced, so a slow scrape that finishes after a newer
    /// one, or a redelivered task, cannot resurrect older state. An empty
    /// slot set is a valid snapshot.
    pub async fn apply(
        &self,
        venue_id: &VenueId,
        slots: Vec<Slot>,
        observed_at: DateTime<Utc>,
    ) -> Result<DetectionResult, CourtwatchError> {
        let snapshot = Snapshot {
            venue_id: venue_id.clone(),
            observed_at,
            slots,
        };

        match snapshots::replace_snapshot(&self.db, &snapshot).await? {
            SnapshotSwap::Replaced { previous } => {
                let old = previous.map(|p| p.slots).unwrap_or_default();
                let events = diff_snapshots(venue_id, &old, &snapshot.slots, observed_at);
                debug!(
                    venue_id = %venue_id,
                    slots = snapshot.slots.len(),
                    events = events.len(),
                    "snapshot replaced"
                );
                Ok(DetectionResult {
                    venue_id: venue_id.clone(),
                    observed_at,
                    events,
                    stale: false,
                })
            }
            SnapshotSwap::Stale {
                current_observed_at,
            } => {
                warn!(
                    venue_id = %venue_id,
                    observed_at = %observed_at,
                    current = %current_observed_at,
                    "discarding snapshot older than the stored one"
                );
                Ok(DetectionResult {
                    venue_id: venue_id.clone(),
                    observed_at,
                    events: Vec::new(),
                    stale: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtwatch_storage::queries::venues;
    use courtwatch_test_utils::fixtures::{slot, venue};
    use courtwatch_test_utils::fixed_start;
    use proptest::prelude::*;

    fn v1() -> VenueId {
        VenueId::from("v1")
    }

    #[test]
    fn classifies_appeared_disappeared_and_price_changes() {
        let old = vec![slot("v1", "Court 1", 18, 15.0), slot("v1", "Court 2", 18, 15.0)];
        let new = vec![slot("v1", "Court 1", 18, 12.0), slot("v1", "Court 3", 18, 15.0)];

        let events = diff_snapshots(&v1(), &old, &new, fixed_start());
        let kinds: Vec<_> = events.iter().map(|e| (e.slot.key.court.as_str(), e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("Court 1", ChangeKind::PriceChanged),
                ("Court 2", ChangeKind::Disappeared),
                ("Court 3", ChangeKind::Appeared),
            ]
        );
        assert_eq!(events[0].previous_price, Some(15.0));
    }

    #[test]
    fn sub_penny_price_noise_is_not_a_change() {
        let old = vec![slot("v1", "Court 1", 18, 15.0)];
        let new = vec![slot("v1", "Court 1", 18, 15.001)];
        assert!(diff_snapshots(&v1(), &old, &new, fixed_start()).is_empty());
    }

    #[test]
    fn unavailable_slots_count_as_absent() {
        let mut booked = slot("v1", "Court 1", 18, 15.0);
        booked.available = false;
        let free = slot("v1", "Court 1", 18, 15.0);

        let events = diff_snapshots(&v1(), &[free.clone()], &[booked.clone()], fixed_start());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Disappeared);

        let events = diff_snapshots(&v1(), &[booked], &[free], fixed_start());
        assert_eq!(events[0].kind, ChangeKind::Appeared);
    }

    #[test]
    fn empty_to_empty_is_quiet() {
        assert!(diff_snapshots(&v1(), &[], &[], fixed_start()).is_empty());
    }

    fn arb_slots() -> impl Strategy<Value = Vec<Slot>> {
        prop::collection::vec((1u8..5, 6u32..22, 5u32..40, any::<bool>()), 0..12).prop_map(
            |raw| {
                raw.into_iter()
                    .map(|(court, hour, price, available)| {
                        let mut s = slot("v1", &format!("Court {court}"), hour, f64::from(price));
                        s.available = available;
                        s
                    })
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn diff_against_itself_is_empty(slots in arb_slots()) {
            prop_assert!(diff_snapshots(&v1(), &slots, &slots, fixed_start()).is_empty());
        }

        #[test]
        fn every_new_available_key_is_accounted_for(old in arb_slots(), new in arb_slots()) {
            let events = diff_snapshots(&v1(), &old, &new, fixed_start());
            for s in new.iter().filter(|s| s.available) {
                let in_old = old.iter().any(|o| o.available && o.key == s.key);
                let appeared = events
                    .iter()
                    .any(|e| e.kind == ChangeKind::Appeared && e.slot.key == s.key);
                prop_assert_eq!(in_old, !appeared);
            }
        }
    }

    async fn detector() -> ChangeDetector {
        let db = Database::open_in_memory().await.unwrap();
        venues::upsert_venue(&db, &venue("v1"), fixed_start()).await.unwrap();
        ChangeDetector::new(db)
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        fixed_start() + chrono::Duration::minutes(minutes)
    }

    #[tokio::test]
    async fn applying_the_same_set_twice_is_idempotent() {
        let detector = detector().await;
        let slots = vec![slot("v1", "Court 1", 18, 15.0)];

        let first = detector.apply(&v1(), slots.clone(), at(0)).await.unwrap();
        assert_eq!(first.count(ChangeKind::Appeared), 1);

        let second = detector.apply(&v1(), slots, at(5)).await.unwrap();
        assert!(second.events.is_empty());
        assert!(!second.stale);
    }

    #[tokio::test]
    async fn empty_scrape_clears_the_venue() {
        let detector = detector().await;
        detector
            .apply(&v1(), vec![slot("v1", "Court 1", 18, 15.0)], at(0))
            .await
            .unwrap();

        let result = detector.apply(&v1(), Vec::new(), at(5)).await.unwrap();
        assert_eq!(result.count(ChangeKind::Disappeared), 1);
    }

    #[tokio::test]
    async fn older_result_is_discarded() {
        let detector = detector().await;
        detector
            .apply(&v1(), vec![slot("v1", "Court 1", 18, 15.0)], at(0))
            .await
            .unwrap();

        let result = detector.apply(&v1(), Vec::new(), at(-1)).await.unwrap();
        assert!(result.stale);
        assert!(result.events.is_empty());
    }

    #[tokio::test]
    async fn slow_scrape_finishing_last_does_not_overwrite_newer_one() {
        let detector = detector().await;
        // Scrape A starts at 0 and is slow; scrape B starts at 1 and lands first.
        let fast = detector
            .apply(&v1(), vec![slot("v1", "Court 2", 18, 15.0)], at(1))
            .await
            .unwrap();
        assert_eq!(fast.observed_at, at(1));

        let slow = detector
            .apply(&v1(), vec![slot("v1", "Court 1", 18, 15.0)], at(0))
            .await
            .unwrap();
        assert!(slow.stale);
        assert_eq!(slow.observed_at, at(0));

        let current = snapshots::load_snapshot(&detector.db, &v1()).await.unwrap().unwrap();
        assert_eq!(current.observed_at, at(1));
        assert_eq!(current.slots[0].key.court, "Court 2");
    }
}
