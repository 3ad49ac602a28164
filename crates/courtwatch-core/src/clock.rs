// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Injectable time source.
//!
//! Every "now" in the scheduler, queue, detector, ledger, limiter, and
//! retention paths goes through [`Clock`] so tests can drive time by hand.

use chrono::{DateTime, Utc};

use crate::error::CourtwatchError;

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// `at + by`, or a config error naming `setting` when the result falls
/// outside chrono's range.
pub fn checked_after(
    at: DateTime<Utc>,
    by: std::time::Duration,
    setting: &str,
) -> Result<DateTime<Utc>, CourtwatchError> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|by| at.checked_add_signed(by))
        .ok_or_else(|| out_of_range(setting))
}

/// `at - by`, or a config error naming `setting` when the result falls
/// outside chrono's range.
pub fn checked_before(
    at: DateTime<Utc>,
    by: std::time::Duration,
    setting: &str,
) -> Result<DateTime<Utc>, CourtwatchError> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|by| at.checked_sub_signed(by))
        .ok_or_else(|| out_of_range(setting))
}

fn out_of_range(setting: &str) -> CourtwatchError {
    CourtwatchError::Config(format!("{setting} is too large to compute a timestamp"))
}
