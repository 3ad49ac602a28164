// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per table family. Every function takes `&Database`
//! and runs inside a single `conn.call(...)`.

pub mod alerts;
pub mod budgets;
pub mod controls;
pub mod preferences;
pub mod queue;
pub mod retention;
pub mod schedule;
pub mod scrape_logs;
pub mod snapshots;
pub mod venues;
