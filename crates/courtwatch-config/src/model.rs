// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Courtwatch.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use courtwatch_core::{
    NotificationSettings, ScraperConfig, TimeRange, UserId, UserPreferences, Venue, VenueId,
};
use serde::{Deserialize, Serialize};

/// Top-level Courtwatch configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourtwatchConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Scheduler heartbeat settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Task queue lease and retry settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Scraper worker pool settings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Deduplication and rate-limit defaults.
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Retention/cleanup settings.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// External scraper process.
    #[serde(default)]
    pub scraper: ScraperProcessConfig,

    /// Alert delivery.
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Monitored venues (`[[venues]]`).
    #[serde(default)]
    pub venues: Vec<VenueConfig>,

    /// Users and their alert preferences (`[[users]]`).
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

impl CourtwatchConfig {
    /// Configured venues as domain values, filling in the default interval.
    pub fn venues(&self) -> Vec<Venue> {
        self.venues
            .iter()
            .map(|v| v.to_venue(self.scheduler.default_interval_minutes))
            .collect()
    }

    /// Configured users as domain preferences, filling in notification defaults.
    pub fn users(&self) -> Vec<UserPreferences> {
        self.users
            .iter()
            .map(|u| u.to_preferences(&self.alerts))
            .collect()
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Whether to enable WAL (Write-Ahead Logging) mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("courtwatch").join("courtwatch.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("courtwatch.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_true() -> bool {
    true
}

/// Log output configuration. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks.
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,

    /// Interval used by venues that do not set `interval_minutes`.
    #[serde(default = "default_interval_minutes")]
    pub default_interval_minutes: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_tick_seconds(),
            default_interval_minutes: default_interval_minutes(),
        }
    }
}

fn default_tick_seconds() -> u64 {
    15
}

fn default_interval_minutes() -> u32 {
    5
}

/// Task queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Lease duration for a dequeued task before it becomes visible again.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    /// Failures after which a task moves to the dead-letter lane.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,

    /// Relative jitter applied to each backoff delay, in `[0, 1)`.
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// How long `dequeue` blocks before returning nothing.
    #[serde(default = "default_dequeue_timeout_secs")]
    pub dequeue_timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: default_visibility_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
            jitter: default_jitter(),
            dequeue_timeout_secs: default_dequeue_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_visibility_timeout_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    4
}

fn default_backoff_base_secs() -> u64 {
    30
}

fn default_backoff_cap_secs() -> u64 {
    1800
}

fn default_jitter() -> f64 {
    0.2
}

fn default_dequeue_timeout_secs() -> u64 {
    5
}

fn default_poll_interval_ms() -> u64 {
    250
}

/// Scraper worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Hard per-task scrape timeout.
    #[serde(default = "default_scrape_timeout_secs")]
    pub scrape_timeout_secs: u64,

    /// How long in-flight tasks may drain after a shutdown signal.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            scrape_timeout_secs: default_scrape_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_scrape_timeout_secs() -> u64 {
    120
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

/// Alerting defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AlertsConfig {
    /// How long an alert record suppresses repeats.
    #[serde(default = "default_dedup_ttl_hours")]
    pub dedup_ttl_hours: u64,

    #[serde(default = "default_max_alerts_per_hour")]
    pub default_max_alerts_per_hour: u32,

    #[serde(default = "default_max_alerts_per_day")]
    pub default_max_alerts_per_day: u32,

    /// Alert on price drops of already-available slots.
    #[serde(default = "default_true")]
    pub notify_price_drops: bool,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            dedup_ttl_hours: default_dedup_ttl_hours(),
            default_max_alerts_per_hour: default_max_alerts_per_hour(),
            default_max_alerts_per_day: default_max_alerts_per_day(),
            notify_price_drops: true,
        }
    }
}

fn default_dedup_ttl_hours() -> u64 {
    168
}

fn default_max_alerts_per_hour() -> u32 {
    10
}

fn default_max_alerts_per_day() -> u32 {
    50
}

/// Retention/cleanup configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Records older than this many days are deletion candidates.
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Records examined per batch (max 10000).
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Report what would be deleted without deleting.
    #[serde(default)]
    pub dry_run: bool,

    /// Hours between runs of the in-process retention loop.
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Consecutive zero-deletion runs that raise an anomaly.
    #[serde(default = "default_zero_deletion_alert_runs")]
    pub zero_deletion_alert_runs: u32,

    /// Deletions in a single run above which an anomaly is raised.
    #[serde(default = "default_max_deletions_alert")]
    pub max_deletions_alert: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            batch_size: default_batch_size(),
            dry_run: false,
            interval_hours: default_interval_hours(),
            zero_deletion_alert_runs: default_zero_deletion_alert_runs(),
            max_deletions_alert: default_max_deletions_alert(),
        }
    }
}

fn default_window_days() -> u32 {
    7
}

fn default_batch_size() -> u32 {
    1000
}

fn default_interval_hours() -> u64 {
    24
}

fn default_zero_deletion_alert_runs() -> u32 {
    3
}

fn default_max_deletions_alert() -> u64 {
    100_000
}

/// External scraper program.
///
/// The program receives the venue as JSON on stdin and prints a JSON slot
/// array on stdout.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScraperProcessConfig {
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,
}

/// Alert delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotifierConfig {
    /// Alerts are POSTed here as JSON. Without it, alerts are logged.
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_notifier_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_notifier_timeout_secs(),
        }
    }
}

fn default_notifier_timeout_secs() -> u64 {
    10
}

/// A `[[venues]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VenueConfig {
    pub id: String,

    pub name: String,

    /// Booking page URL.
    pub url: String,

    /// Falls back to `scheduler.default_interval_minutes`.
    #[serde(default)]
    pub interval_minutes: Option<u32>,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default)]
    pub scraper: ScraperConfig,
}

impl VenueConfig {
    pub fn to_venue(&self, default_interval_minutes: u32) -> Venue {
        Venue {
            id: VenueId(self.id.clone()),
            name: self.name.clone(),
            url: self.url.clone(),
            interval_minutes: self.interval_minutes.unwrap_or(default_interval_minutes),
            active: self.active,
            scraper: self.scraper.clone(),
        }
    }
}

/// A `[[users]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    pub id: String,

    pub email: String,

    /// Venue ids or names. Empty means any venue.
    #[serde(default)]
    pub preferred_venues: Vec<String>,

    /// Venue ids or names that never match, even if preferred.
    #[serde(default)]
    pub excluded_venues: Vec<String>,

    /// Lowercase weekday names. Empty means any day.
    #[serde(default)]
    pub preferred_days: Vec<String>,

    /// Preferred time-of-day ranges. Empty means any time.
    #[serde(default)]
    pub times: Vec<TimeRange>,

    /// Zero means any price.
    #[serde(default)]
    pub max_price: f64,

    #[serde(default)]
    pub notifications: NotificationsConfig,
}

impl UserConfig {
    pub fn to_preferences(&self, alerts: &AlertsConfig) -> UserPreferences {
        UserPreferences {
            user_id: UserId(self.id.clone()),
            email: self.email.clone(),
            active: true,
            preferred_venues: self.preferred_venues.clone(),
            excluded_venues: self.excluded_venues.clone(),
            preferred_days: self
                .preferred_days
                .iter()
                .map(|d| d.to_lowercase())
                .collect(),
            times: self.times.clone(),
            max_price: self.max_price,
            notifications: self.notifications.resolve(alerts),
        }
    }
}

/// `[users.notifications]`. Omitted fields take the global defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub max_alerts_per_hour: Option<u32>,

    #[serde(default)]
    pub max_alerts_per_day: Option<u32>,

    #[serde(default)]
    pub alert_time_window_start: Option<String>,

    #[serde(default)]
    pub alert_time_window_end: Option<String>,

    #[serde(default)]
    pub unsubscribed: bool,

    #[serde(default)]
    pub instant_alerts: Option<bool>,
}

impl NotificationsConfig {
    fn resolve(&self, alerts: &AlertsConfig) -> NotificationSettings {
        let defaults = NotificationSettings::default();
        NotificationSettings {
            instant_alerts: self.instant_alerts.unwrap_or(defaults.instant_alerts),
            max_alerts_per_hour: self
                .max_alerts_per_hour
                .unwrap_or(alerts.default_max_alerts_per_hour),
            max_alerts_per_day: self
                .max_alerts_per_day
                .unwrap_or(alerts.default_max_alerts_per_day),
            alert_time_window_start: self
                .alert_time_window_start
                .clone()
                .or(defaults.alert_time_window_start),
            alert_time_window_end: self
                .alert_time_window_end
                .clone()
                .or(defaults.alert_time_window_end),
            unsubscribed: self.unsubscribed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_interval_falls_back_to_scheduler_default() {
        let config: CourtwatchConfig = toml::from_str(
            r#"
[[venues]]
id = "victoria-park"
name = "Victoria Park"
url = "https://example.org/victoria"

[[venues]]
id = "highbury"
name = "Highbury Fields"
url = "https://example.org/highbury"
interval_minutes = 10
active = false
"#,
        )
        .unwrap();

        let venues = config.venues();
        assert_eq!(venues[0].interval_minutes, 5);
        assert!(venues[0].active);
        assert_eq!(venues[1].interval_minutes, 10);
        assert!(!venues[1].active);
    }

    #[test]
    fn venue_scraper_parameters_are_opaque() {
        let config: CourtwatchConfig = toml::from_str(
            r#"
[[venues]]
id = "v"
name = "V"
url = "https://example.org"

[venues.scraper]
platform = "clubspark"
parameters = { club_slug = "victoria-park", court_filter = "hard" }
"#,
        )
        .unwrap();

        let venue = &config.venues()[0];
        assert_eq!(venue.scraper.platform, courtwatch_core::ScraperPlatform::Clubspark);
        assert_eq!(
            venue.scraper.parameters.get("club_slug").map(String::as_str),
            Some("victoria-park")
        );
    }

    #[test]
    fn user_notifications_take_defaults() {
        let config: CourtwatchConfig = toml::from_str(
            r#"
[alerts]
default_max_alerts_per_hour = 3

[[users]]
id = "u1"
email = "u1@example.org"
preferred_days = ["Saturday"]
max_price = 20.0
times = [{ start = "18:00", end = "20:00" }]
"#,
        )
        .unwrap();

        let prefs = &config.users()[0];
        assert_eq!(prefs.notifications.max_alerts_per_hour, 3);
        assert_eq!(prefs.notifications.max_alerts_per_day, 50);
        assert_eq!(
            prefs.notifications.alert_time_window_start.as_deref(),
            Some("07:00")
        );
        assert!(prefs.notifications.instant_alerts);
        assert_eq!(prefs.preferred_days, vec!["saturday"]);
        assert_eq!(prefs.times[0].start, "18:00");
    }

    #[test]
    fn users_deny_unknown_fields() {
        let result = toml::from_str::<CourtwatchConfig>(
            r#"
[[users]]
id = "u1"
email = "u1@example.org"
max_prize = 20.0
"#,
        );
        assert!(result.is_err());
    }
}
