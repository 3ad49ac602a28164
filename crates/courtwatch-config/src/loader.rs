// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./courtwatch.toml` > `~/.config/courtwatch/courtwatch.toml`
//! > `/etc/courtwatch/courtwatch.toml` with environment variable overrides via the
//! `COURTWATCH_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::CourtwatchConfig;

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/courtwatch/courtwatch.toml";
pub(crate) const LOCAL_CONFIG_PATH: &str = "courtwatch.toml";

/// Sections that may be overridden through `COURTWATCH_<SECTION>_<KEY>`.
const ENV_SECTIONS: &[&str] = &[
    "storage",
    "logging",
    "scheduler",
    "queue",
    "worker",
    "alerts",
    "retention",
    "scraper",
    "notifier",
];

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("courtwatch/courtwatch.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/courtwatch/courtwatch.toml` (system-wide)
/// 3. `~/.config/courtwatch/courtwatch.toml` (user XDG config)
/// 4. `./courtwatch.toml` (local directory)
/// 5. `COURTWATCH_*` environment variables
pub fn load_config() -> Result<CourtwatchConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<CourtwatchConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourtwatchConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CourtwatchConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourtwatchConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CourtwatchConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Environment provider mapping `COURTWATCH_QUEUE_MAX_ATTEMPTS` to `queue.max_attempts`.
///
/// Only the leading section name is split off; key names keep their
/// underscores. `Env::split("_")` would turn `max_attempts` into `max.attempts`.
fn env_provider() -> Env {
    Env::prefixed("COURTWATCH_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
