// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courtwatch unit and integration tests.
//!
//! Provides scripted collaborators and harness infrastructure for fast,
//! deterministic tests without real booking sites or mail delivery.
//!
//! # Components
//!
//! - [`ManualClock`] - Clock that only moves when told to
//! - [`MockScraper`] - Scraper with per-venue scripted results
//! - [`RecordingNotifier`] - Notifier that captures alerts, optionally failing
//! - [`TestHarness`] - Full pipeline over a temp database
//! - [`fixtures`] - Venue, slot and user builders

pub mod clock;
pub mod fixtures;
pub mod harness;
pub mod mock_scraper;
pub mod recording_notifier;

pub use clock::{fixed_start, ManualClock};
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_scraper::MockScraper;
pub use recording_notifier::RecordingNotifier;
