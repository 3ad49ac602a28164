// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slot-against-preference matching.
//!
//! Shared by the alert dispatcher (who to notify) and the retention
//! service (what history is still relevant).

use chrono::NaiveTime;
use courtwatch_core::{CourtwatchError, Slot, TimeRange, UserPreferences};

/// Parse an `HH:MM` time of day.
pub fn parse_hhmm(raw: &str) -> Result<NaiveTime, CourtwatchError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| CourtwatchError::Config(format!("invalid time of day '{raw}', expected HH:MM")))
}

/// Check `slot` at venue `venue_name` against one user's preferences.
///
/// Returns the human-readable match reason, `None` when any criterion
/// fails, or an error when the preference's time ranges do not parse.
/// Exclusion wins over inclusion; empty lists and a non-positive max price
/// mean "no restriction".
pub fn match_slot(
    prefs: &UserPreferences,
    venue_name: &str,
    slot: &Slot,
) -> Result<Option<String>, CourtwatchError> {
    let venue_id = slot.key.venue_id.as_str();
    let names_venue = |v: &String| v == venue_id || v == venue_name;

    if prefs.excluded_venues.iter().any(names_venue) {
        return Ok(None);
    }
    if !prefs.preferred_venues.is_empty() && !prefs.preferred_venues.iter().any(names_venue) {
        return Ok(None);
    }

    let weekday = slot.key.weekday_name();
    if !prefs.preferred_days.is_empty()
        && !prefs.preferred_days.iter().any(|d| d.eq_ignore_ascii_case(&weekday))
    {
        return Ok(None);
    }

    if !prefs.times.is_empty() && !overlaps_any(&prefs.times, slot)? {
        return Ok(None);
    }

    let priced = prefs.max_price > 0.0;
    if priced && slot.price > prefs.max_price {
        return Ok(None);
    }

    let mut reasons = Vec::new();
    if !prefs.preferred_venues.is_empty() {
        reasons.push(format!("preferred venue: {venue_name}"));
    }
    if !prefs.preferred_days.is_empty() {
        reasons.push(format!("preferred day: {weekday}"));
    }
    if !prefs.times.is_empty() {
        reasons.push(format!(
            "preferred time: {}-{}",
            slot.key.start.format("%H:%M"),
            slot.key.end.format("%H:%M")
        ));
    }
    if priced {
        reasons.push(format!(
            "within budget: £{:.2} <= £{:.2}",
            slot.price, prefs.max_price
        ));
    }

    if reasons.is_empty() {
        Ok(Some("matches default preferences".to_string()))
    } else {
        Ok(Some(reasons.join(", ")))
    }
}

/// Half-open `[start, end)` overlap with at least one preferred range.
fn overlaps_any(ranges: &[TimeRange], slot: &Slot) -> Result<bool, CourtwatchError> {
    for range in ranges {
        let start = parse_hhmm(&range.start)?;
        let end = parse_hhmm(&range.end)?;
        if slot.key.start < end && start < slot.key.end {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Whether any of `users` (assumed active) matches the slot.
///
/// A user whose preferences fail to parse is skipped and counted in the
/// returned error tally rather than failing the whole check.
pub fn matches_any(users: &[UserPreferences], venue_name: &str, slot: &Slot) -> (bool, usize) {
    let mut errors = 0;
    for prefs in users {
        match match_slot(prefs, venue_name, slot) {
            Ok(Some(_)) => return (true, errors),
            Ok(None) => {}
            Err(_) => errors += 1,
        }
    }
    (false, errors)
}
