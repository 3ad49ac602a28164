// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Courtwatch configuration system.

use courtwatch_config::diagnostic::ConfigError;
use courtwatch_config::model::CourtwatchConfig;
use courtwatch_config::{load_and_validate_str, load_config_from_path, load_config_from_str};
use serial_test::serial;

/// A realistic full config deserializes with every section populated.
#[test]
fn full_config_deserializes() {
    let toml = r#"
[storage]
database_path = "/tmp/courtwatch.db"
wal_mode = false

[logging]
level = "debug"
json = true

[scheduler]
tick_seconds = 10

[queue]
max_attempts = 5
backoff_base_secs = 10

[worker]
concurrency = 8

[alerts]
notify_price_drops = false

[retention]
window_days = 14
batch_size = 500
dry_run = true

[notifier]
webhook_url = "https://hooks.example.org/courtwatch"

[[venues]]
id = "victoria-park"
name = "Victoria Park"
url = "https://clubspark.lta.org.uk/VictoriaPark"

[venues.scraper]
platform = "clubspark"

[[users]]
id = "alice"
email = "alice@example.org"
preferred_venues = ["victoria-park"]
preferred_days = ["saturday", "sunday"]
times = [{ start = "18:00", end = "20:00" }]
max_price = 20.0

[users.notifications]
max_alerts_per_hour = 2
alert_time_window_start = "22:00"
alert_time_window_end = "07:00"
"#;

    let config = load_and_validate_str(toml).expect("valid config");
    assert_eq!(config.storage.database_path, "/tmp/courtwatch.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
    assert_eq!(config.scheduler.tick_seconds, 10);
    assert_eq!(config.queue.max_attempts, 5);
    assert_eq!(config.queue.backoff_cap_secs, 1800);
    assert_eq!(config.worker.concurrency, 8);
    assert!(!config.alerts.notify_price_drops);
    assert_eq!(config.retention.window_days, 14);
    assert!(config.retention.dry_run);
    assert_eq!(config.venues.len(), 1);

    let users = config.users();
    assert_eq!(users[0].notifications.max_alerts_per_hour, 2);
    assert_eq!(users[0].notifications.max_alerts_per_day, 50);
    assert_eq!(
        users[0].notifications.alert_time_window_end.as_deref(),
        Some("07:00")
    );
}

#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty config is valid");
    assert_eq!(config.scheduler.tick_seconds, 15);
    assert_eq!(config.scheduler.default_interval_minutes, 5);
    assert_eq!(config.queue.visibility_timeout_secs, 300);
    assert_eq!(config.queue.max_attempts, 4);
    assert_eq!(config.alerts.dedup_ttl_hours, 168);
    assert_eq!(config.retention.window_days, 7);
    assert_eq!(config.retention.batch_size, 1000);
    assert!(config.storage.database_path.ends_with("courtwatch.db"));
    assert!(config.venues.is_empty());
    assert!(config.users.is_empty());
}

#[test]
fn unknown_field_in_queue_produces_error() {
    let err = load_config_from_str("[queue]\nmax_attemps = 3\n")
        .expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("max_attemps"),
        "error should mention the bad key, got: {err_str}"
    );
}

#[test]
fn unknown_top_level_section_is_rejected() {
    assert!(load_config_from_str("[telemetry]\nenabled = true\n").is_err());
}

#[test]
fn diagnostic_suggests_close_key() {
    let errors = load_and_validate_str("[retention]\nwindw_days = 3\n")
        .expect_err("should reject unknown key");

    let suggested = errors.iter().any(|e| {
        matches!(
            e,
            ConfigError::UnknownKey { key, section, suggestion: Some(s), valid_keys, .. }
                if key == "windw_days"
                    && section == "[retention]"
                    && s == "window_days"
                    && valid_keys.contains("batch_size")
        )
    });
    assert!(suggested, "expected a window_days suggestion, got: {errors:?}");
}

#[test]
fn diagnostic_invalid_type_message() {
    let err = load_config_from_str("[worker]\nconcurrency = \"many\"\n")
        .expect_err("should reject invalid type");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("invalid type") || err_str.contains("concurrency"),
        "error should mention type mismatch, got: {err_str}"
    );
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "max_attemps".to_string(),
        section: "[queue]".to_string(),
        suggestion: Some("max_attempts".to_string()),
        valid_keys: "max_attempts, jitter".to_string(),
        span: None,
        src: None,
    };
    assert!(error.code().is_some());
    let help = error.help().expect("help text").to_string();
    assert!(help.contains("did you mean `max_attempts`"), "got: {help}");

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("max_attemps"));
}

#[test]
fn validation_collects_multiple_errors() {
    let toml = r#"
[queue]
max_attempts = 0

[retention]
batch_size = 20000
"#;
    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    assert!(messages.iter().any(|m| m.contains("queue.max_attempts")));
    assert!(messages.iter().any(|m| m.contains("retention.batch_size")));
}

/// `COURTWATCH_QUEUE_MAX_ATTEMPTS` maps to `queue.max_attempts`, not `queue.max.attempts`.
#[test]
#[serial]
fn env_var_overrides_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("courtwatch.toml", "[queue]\nmax_attempts = 3\n")?;
        jail.set_env("COURTWATCH_QUEUE_MAX_ATTEMPTS", "7");
        jail.set_env("COURTWATCH_RETENTION_DRY_RUN", "true");

        let config = load_config_from_path(std::path::Path::new("courtwatch.toml"))?;
        assert_eq!(config.queue.max_attempts, 7);
        assert!(config.retention.dry_run);
        Ok(())
    });
}

#[test]
fn missing_config_file_is_skipped() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let config: CourtwatchConfig = Figment::new()
        .merge(Serialized::defaults(CourtwatchConfig::default()))
        .merge(Toml::file("/nonexistent/path/courtwatch.toml"))
        .extract()
        .expect("missing file should be silently skipped");
    assert_eq!(config.queue.max_attempts, 4);
}
