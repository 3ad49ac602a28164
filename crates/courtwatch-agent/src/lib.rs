// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-running loops for the Courtwatch daemon.
//!
//! The [`Runtime`] owns the shared queue and dispatcher and runs:
//! - the scheduler tick loop, enqueueing due venues
//! - a pool of [`Worker`]s, each scraping one leased task at a time
//! - the retention loop
//!
//! All loops watch one cancellation token and are drained on shutdown.

pub mod runtime;
pub mod shutdown;
pub mod sync;
pub mod worker;

pub use runtime::Runtime;
pub use shutdown::{install_signal_handler, DrainOutcome};
pub use sync::{sync_from_config, SyncReport};
pub use worker::{WorkOutcome, Worker};
