// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the scheduler, queue, detector, and alerting path.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Prices closer than this are treated as equal.
pub const PRICE_EPSILON: f64 = 0.005;

/// Unique identifier for a venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(pub String);

/// Unique identifier for a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Unique identifier for a scrape task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a fresh random task id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

macro_rules! string_id {
    ($($ty:ident),*) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl $ty {
            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    )*};
}

string_id!(VenueId, UserId, TaskId);

/// Booking platform a venue's scraper targets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScraperPlatform {
    Clubspark,
    Courtside,
    Custom,
}

/// Scraper-specific venue configuration.
///
/// `parameters` is passed verbatim to the scraper collaborator and never
/// interpreted by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScraperConfig {
    pub platform: ScraperPlatform,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            platform: ScraperPlatform::Custom,
            parameters: BTreeMap::new(),
        }
    }
}

/// A monitored booking site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: VenueId,
    pub name: String,
    pub url: String,
    pub interval_minutes: u32,
    pub active: bool,
    pub scraper: ScraperConfig,
}

impl Venue {
    /// Scrape interval as a chrono duration.
    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.interval_minutes))
    }
}

/// Identity of a slot: everything except price and availability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub venue_id: VenueId,
    pub court: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl SlotKey {
    /// Lowercase English weekday of the slot date (`"saturday"`).
    pub fn weekday_name(&self) -> String {
        self.date.weekday().to_string().to_lowercase()
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}:{}",
            self.venue_id,
            self.date.format("%Y-%m-%d"),
            self.start.format("%H:%M"),
            self.end.format("%H:%M"),
            self.court
        )
    }
}

/// A bookable court/date/time unit as observed by the scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub key: SlotKey,
    pub price: f64,
    pub available: bool,
}

/// Whether two prices differ by more than [`PRICE_EPSILON`].
pub fn prices_differ(a: f64, b: f64) -> bool {
    (a - b).abs() > PRICE_EPSILON
}

/// The complete slot set observed for a venue at one scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub venue_id: VenueId,
    pub observed_at: DateTime<Utc>,
    pub slots: Vec<Slot>,
}

/// Kind of difference between two consecutive snapshots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Appeared,
    Disappeared,
    PriceChanged,
}

/// A single slot-level change produced by the change detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub venue_id: VenueId,
    /// The slot as currently observed, or as last seen for `Disappeared`.
    pub slot: Slot,
    pub kind: ChangeKind,
    /// Previous price, set for `PriceChanged`.
    pub previous_price: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn key(&self) -> &SlotKey {
        &self.slot.key
    }
}

/// Ledger entry proving an alert for (user, slot key) was dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub user_id: UserId,
    pub slot_key: String,
    pub first_sent_at: DateTime<Utc>,
    pub sent_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub send_count: u32,
}

impl AlertRecord {
    /// A record suppresses repeat alerts until it expires.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Lifecycle state of a scrape task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the queue (possibly delayed by backoff).
    Pending,
    /// Claimed by a worker under a visibility lease.
    Leased,
    /// Exhausted retries or failed permanently; awaiting an operator.
    DeadLetter,
}

/// A "scrape this venue now" job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub venue_id: VenueId,
    pub status: TaskStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time the task may be handed to a worker.
    pub available_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub dead_lettered_at: Option<DateTime<Utc>>,
}

/// A task currently owned by a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct LeasedTask {
    pub task: Task,
    pub worker_id: String,
    pub lease_expires_at: DateTime<Utc>,
}

/// A preferred time-of-day range, `HH:MM` bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

/// Per-user alert volume and delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Users who disable instant alerts receive nothing from the live path.
    pub instant_alerts: bool,
    /// Zero means no hourly cap.
    pub max_alerts_per_hour: u32,
    /// Zero means no daily cap.
    pub max_alerts_per_day: u32,
    pub alert_time_window_start: Option<String>,
    pub alert_time_window_end: Option<String>,
    pub unsubscribed: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            instant_alerts: true,
            max_alerts_per_hour: 10,
            max_alerts_per_day: 50,
            alert_time_window_start: Some("07:00".to_string()),
            alert_time_window_end: Some("22:00".to_string()),
            unsubscribed: false,
        }
    }
}

/// What a user wants to be alerted about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: UserId,
    pub email: String,
    /// Users removed from configuration are kept but deactivated.
    pub active: bool,
    pub preferred_venues: Vec<String>,
    pub excluded_venues: Vec<String>,
    pub preferred_days: Vec<String>,
    pub times: Vec<TimeRange>,
    /// Zero or negative means no price limit.
    pub max_price: f64,
    pub notifications: NotificationSettings,
}

impl UserPreferences {
    /// Active and subscribed.
    pub fn is_alertable(&self) -> bool {
        self.active && !self.notifications.unsubscribed
    }
}

/// A notification handed to the notifier collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub user_id: UserId,
    pub email: String,
    pub venue_name: String,
    pub booking_url: String,
    pub slot: Slot,
    pub kind: ChangeKind,
    pub previous_price: Option<f64>,
    /// Why the slot matched the user's preferences.
    pub reason: String,
}
