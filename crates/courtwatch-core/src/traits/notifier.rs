// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notifier trait for alert delivery.

use async_trait::async_trait;

use crate::error::CourtwatchError;
use crate::types::Alert;

/// Delivers alerts to users (email, push, webhook).
///
/// Delivery is at-most-once from the dispatcher's point of view: the
/// dedup record is written before `notify` is called and is not rolled
/// back on failure.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, alert: &Alert) -> Result<(), CourtwatchError>;
}
