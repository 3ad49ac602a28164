// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-driven work for Courtwatch: the per-venue scrape scheduler and the
//! observation-history retention service.

pub mod retention;
pub mod scheduler;

pub use retention::{RetentionAnomaly, RetentionReport, RetentionService};
pub use scheduler::{Scheduler, SchedulerStatus, TickReport, VenueStatus};
