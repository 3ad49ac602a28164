// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scraper trait for booking-site extraction.

use async_trait::async_trait;

use crate::error::ScrapeError;
use crate::types::{Slot, Venue};

/// Fetches the current slot set for a venue.
///
/// Implementations classify every failure as transient or permanent; the
/// worker relies on that classification to decide between retry and the
/// dead-letter lane. Timeouts are enforced by the caller.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Scrapes the venue and returns every slot currently listed.
    async fn scrape(&self, venue: &Venue) -> Result<Vec<Slot>, ScrapeError>;
}
