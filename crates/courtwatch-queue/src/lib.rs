// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reliable scrape task queue for Courtwatch.
//!
//! Tasks are leased with a visibility timeout, retried with jittered
//! exponential backoff, and moved to a dead-letter lane once they exhaust
//! their attempts. Delivery is at-least-once; consumers must be idempotent.

pub mod retry;
pub mod task_queue;

pub use retry::{RetryPolicy, MAX_BACKOFF};
pub use task_queue::{NackReason, TaskQueue};
