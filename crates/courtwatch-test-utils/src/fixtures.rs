// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain value builders shared by tests across the workspace.

use chrono::{NaiveDate, NaiveTime};
use courtwatch_core::{
    NotificationSettings, ScraperConfig, Slot, SlotKey, TimeRange, UserId, UserPreferences, Venue,
    VenueId,
};

/// Active venue named "`{id}` courts" with a 5 minute interval.
pub fn venue(id: &str) -> Venue {
    Venue {
        id: VenueId::from(id),
        name: format!("{id} courts"),
        url: format!("https://{id}.example.com/book"),
        interval_minutes: 5,
        active: true,
        scraper: ScraperConfig::default(),
    }
}

/// An available one-hour slot on Saturday 2026-03-14 starting at `hour`.
pub fn slot(venue_id: &str, court: &str, hour: u32, price: f64) -> Slot {
    Slot {
        key: SlotKey {
            venue_id: VenueId::from(venue_id),
            court: court.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap_or_default(),
            start: NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt((hour + 1) % 24, 0, 0).unwrap_or_default(),
        },
        price,
        available: true,
    }
}

/// An active user with no venue, day, or time restrictions, no price limit,
/// default notification settings and the quiet-hour window disabled.
pub fn user(id: &str) -> UserPreferences {
    UserPreferences {
        user_id: UserId::from(id),
        email: format!("{id}@example.com"),
        active: true,
        preferred_venues: Vec::new(),
        excluded_venues: Vec::new(),
        preferred_days: Vec::new(),
        times: Vec::new(),
        max_price: 0.0,
        notifications: NotificationSettings {
            alert_time_window_start: None,
            alert_time_window_end: None,
            ..NotificationSettings::default()
        },
    }
}

/// `HH:MM` range helper.
pub fn range(start: &str, end: &str) -> TimeRange {
    TimeRange {
        start: start.to_string(),
        end: end.to_string(),
    }
}
