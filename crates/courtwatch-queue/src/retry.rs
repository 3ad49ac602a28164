// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Jittered exponential backoff for failed scrape tasks.

use std::time::Duration;

use courtwatch_config::model::QueueConfig;
use rand::Rng;

/// Longest delay a policy will schedule before jitter.
pub const MAX_BACKOFF: Duration = Duration::from_secs(7 * 24 * 3600);

/// Exponential backoff `base * 2^n`, capped, where `n` is the zero-based
/// index of the failed attempt. The first retry waits `base`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    base: Duration,
    cap: Duration,
    /// Relative jitter in `[0, 1)`; a delay `d` becomes uniform in `[d(1-j), d(1+j)]`.
    jitter: f64,
}

impl RetryPolicy {
    /// `base` and `cap` are clamped to [`MAX_BACKOFF`].
    pub fn new(base: Duration, cap: Duration, jitter: f64) -> Self {
        let base = base.min(MAX_BACKOFF);
        Self {
            base,
            cap: cap.max(base).min(MAX_BACKOFF),
            jitter: jitter.clamp(0.0, 0.99),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(
            Duration::from_secs(config.backoff_base_secs),
            Duration::from_secs(config.backoff_cap_secs),
            config.jitter,
        )
    }

    /// Deterministic delay after `attempts` failures, before jitter.
    ///
    /// `attempts` is the failure count including the one just recorded, so
    /// `attempts = 1` yields `base`. Zero is treated as one.
    pub fn base_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base
            .checked_mul(factor)
            .map_or(self.cap, |d| d.min(self.cap))
    }

    /// Jittered delay after `attempts` failures. Never exceeds
    /// `cap * (1 + jitter)` and never goes below `base * (1 - jitter)`.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let delay = self.base_delay(attempts);
        if self.jitter == 0.0 {
            return delay;
        }
        let scale = rand::thread_rng().gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        delay.mul_f64(scale)
    }

    /// The same policy with jitter removed, for deterministic schedules.
    pub fn without_jitter(self) -> Self {
        Self { jitter: 0.0, ..self }
    }

    /// `delay_for` as a `chrono` duration, the unit the store works in.
    pub(crate) fn chrono_delay(&self, attempts: u32) -> chrono::Duration {
        // At most twice MAX_BACKOFF, so the millisecond count fits an i64.
        chrono::Duration::milliseconds(self.delay_for(attempts).as_millis() as i64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}
