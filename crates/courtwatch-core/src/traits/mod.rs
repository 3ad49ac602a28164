// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits for the systems Courtwatch talks to but does not own.

pub mod notifier;
pub mod scraper;

pub use notifier::Notifier;
pub use scraper::Scraper;
