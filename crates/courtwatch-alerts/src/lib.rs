// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Change detection and alerting for Courtwatch.
//!
//! The flow for one scrape result: [`ChangeDetector`] swaps in the new
//! snapshot and diffs it against the one it replaced, then
//! [`AlertDispatcher`] matches candidate events against user preferences,
//! consults the [`DedupLedger`] and [`RateLimiter`], and notifies.

pub mod dedup;
pub mod detector;
pub mod dispatch;
pub mod matcher;
pub mod rate_limit;

pub use dedup::DedupLedger;
pub use detector::{diff_snapshots, ChangeDetector, DetectionResult};
pub use dispatch::{AlertDispatcher, DispatchOutcome, DispatchRecord, DispatchReport};
pub use matcher::{match_slot, matches_any};
pub use rate_limit::{BudgetSlot, RateDecision, RateLimiter};
