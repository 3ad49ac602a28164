// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for Courtwatch.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed operations for venues,
//! the scrape task queue, snapshots, the dedup ledger, alert budgets, and
//! retention bookkeeping.
//!
//! Cross-loop coordination relies on the atomic primitives here (conditional
//! inserts, compare-and-swap snapshot replace, IMMEDIATE transactions), never
//! on in-process locks.

pub mod convert;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::*;
