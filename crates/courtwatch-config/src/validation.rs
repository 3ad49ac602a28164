// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as positive intervals, `HH:MM` time strings, and unique ids.

use std::collections::HashSet;

use chrono::NaiveTime;

use crate::diagnostic::ConfigError;
use crate::model::CourtwatchConfig;

/// Largest retention batch accepted.
pub const MAX_RETENTION_BATCH: u32 = 10_000;

/// Longest lease a worker may hold (one day).
pub const MAX_VISIBILITY_TIMEOUT_SECS: u64 = 86_400;

/// Longest retry backoff, base or cap (one week).
pub const MAX_BACKOFF_SECS: u64 = 604_800;

/// Longest dedup window (one year).
pub const MAX_DEDUP_TTL_HOURS: u64 = 8_760;

/// Longest history window (ten years).
pub const MAX_RETENTION_WINDOW_DAYS: u32 = 3_650;

const WEEKDAYS: &[&str] = &[
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CourtwatchConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.scheduler.tick_seconds == 0 {
        fail("scheduler.tick_seconds must be positive".to_string());
    }
    if config.scheduler.default_interval_minutes == 0 {
        fail("scheduler.default_interval_minutes must be positive".to_string());
    }

    let queue = &config.queue;
    if queue.max_attempts < 1 {
        fail("queue.max_attempts must be at least 1".to_string());
    }
    let visibility = queue.visibility_timeout_secs;
    if visibility == 0 || visibility > MAX_VISIBILITY_TIMEOUT_SECS {
        fail(format!(
            "queue.visibility_timeout_secs must be between 1 and \
             {MAX_VISIBILITY_TIMEOUT_SECS}, got {visibility}"
        ));
    }
    if queue.backoff_base_secs > MAX_BACKOFF_SECS {
        fail(format!(
            "queue.backoff_base_secs must be at most {MAX_BACKOFF_SECS}, got {}",
            queue.backoff_base_secs
        ));
    }
    if queue.backoff_cap_secs > MAX_BACKOFF_SECS {
        fail(format!(
            "queue.backoff_cap_secs must be at most {MAX_BACKOFF_SECS}, got {}",
            queue.backoff_cap_secs
        ));
    }
    if queue.backoff_cap_secs < queue.backoff_base_secs {
        fail(format!(
            "queue.backoff_cap_secs ({}) must be >= queue.backoff_base_secs ({})",
            queue.backoff_cap_secs, queue.backoff_base_secs
        ));
    }
    if !(0.0..1.0).contains(&queue.jitter) {
        fail(format!("queue.jitter must be in [0, 1), got {}", queue.jitter));
    }
    if queue.poll_interval_ms == 0 {
        fail("queue.poll_interval_ms must be positive".to_string());
    }

    if config.worker.concurrency == 0 {
        fail("worker.concurrency must be at least 1".to_string());
    }
    if config.worker.scrape_timeout_secs == 0 {
        fail("worker.scrape_timeout_secs must be positive".to_string());
    }
    // A lease that expires mid-scrape is redelivered to a second worker.
    if config.worker.scrape_timeout_secs >= visibility {
        fail(format!(
            "worker.scrape_timeout_secs ({}) must be below queue.visibility_timeout_secs \
             ({visibility})",
            config.worker.scrape_timeout_secs
        ));
    }

    let ttl = config.alerts.dedup_ttl_hours;
    if ttl == 0 || ttl > MAX_DEDUP_TTL_HOURS {
        fail(format!(
            "alerts.dedup_ttl_hours must be between 1 and {MAX_DEDUP_TTL_HOURS}, got {ttl}"
        ));
    }

    let retention = &config.retention;
    if retention.window_days == 0 || retention.window_days > MAX_RETENTION_WINDOW_DAYS {
        fail(format!(
            "retention.window_days must be between 1 and {MAX_RETENTION_WINDOW_DAYS}, got {}",
            retention.window_days
        ));
    }
    if retention.batch_size == 0 || retention.batch_size > MAX_RETENTION_BATCH {
        fail(format!(
            "retention.batch_size must be between 1 and {MAX_RETENTION_BATCH}, got {}",
            retention.batch_size
        ));
    }
    if retention.interval_hours == 0 {
        fail("retention.interval_hours must be positive".to_string());
    }

    if let Some(command) = &config.scraper.command
        && command.trim().is_empty()
    {
        fail("scraper.command must not be empty when set".to_string());
    }
    if let Some(url) = &config.notifier.webhook_url
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        fail(format!("notifier.webhook_url `{url}` must be an http(s) URL"));
    }

    let mut venue_ids = HashSet::new();
    for (i, venue) in config.venues.iter().enumerate() {
        if venue.id.trim().is_empty() {
            fail(format!("venues[{i}].id must not be empty"));
        } else if !venue_ids.insert(venue.id.as_str()) {
            fail(format!("duplicate venue id `{}` in [[venues]] array", venue.id));
        }
        if venue.url.trim().is_empty() {
            fail(format!("venues[{i}].url must not be empty"));
        }
        if venue.interval_minutes == Some(0) {
            fail(format!("venues[{i}].interval_minutes must be positive"));
        }
    }

    let mut user_ids = HashSet::new();
    for (i, user) in config.users.iter().enumerate() {
        if user.id.trim().is_empty() {
            fail(format!("users[{i}].id must not be empty"));
        } else if !user_ids.insert(user.id.as_str()) {
            fail(format!("duplicate user id `{}` in [[users]] array", user.id));
        }
        if !user.email.contains('@') {
            fail(format!("users[{i}].email `{}` is not an email address", user.email));
        }
        if user.max_price < 0.0 {
            fail(format!(
                "users[{i}].max_price must be non-negative, got {}",
                user.max_price
            ));
        }
        for day in &user.preferred_days {
            if !WEEKDAYS.contains(&day.to_lowercase().as_str()) {
                fail(format!("users[{i}].preferred_days has unknown day `{day}`"));
            }
        }
        for (j, range) in user.times.iter().enumerate() {
            for (field, value) in [("start", &range.start), ("end", &range.end)] {
                if !is_hhmm(value) {
                    fail(format!(
                        "users[{i}].times[{j}].{field} `{value}` must be HH:MM"
                    ));
                }
            }
        }
        let notifications = &user.notifications;
        for (field, value) in [
            ("alert_time_window_start", &notifications.alert_time_window_start),
            ("alert_time_window_end", &notifications.alert_time_window_end),
        ] {
            if let Some(value) = value
                && !value.is_empty()
                && !is_hhmm(value)
            {
                fail(format!(
                    "users[{i}].notifications.{field} `{value}` must be HH:MM"
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_hhmm(value: &str) -> bool {
    NaiveTime::parse_from_str(value, "%H:%M").is_ok()
}
