// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courtwatch slot monitor.
//!
//! This crate provides the domain types, error types, the injectable clock,
//! and the collaborator traits (scraper, notifier) used throughout the
//! Courtwatch workspace.

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::{checked_after, checked_before, Clock, SystemClock};
pub use error::{CourtwatchError, ScrapeError};
pub use traits::{Notifier, Scraper};
pub use types::{
    prices_differ, Alert, AlertRecord, ChangeEvent, ChangeKind, LeasedTask, NotificationSettings,
    ScraperConfig, ScraperPlatform, Slot, SlotKey, Snapshot, Task, TaskId, TaskStatus,
    TimeRange, UserId, UserPreferences, Venue, VenueId,
};
