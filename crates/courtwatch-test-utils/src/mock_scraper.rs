// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted scraper for deterministic testing.
//!
//! `MockScraper` implements `Scraper` with per-venue queues of canned
//! results. When a venue's queue is empty it returns that venue's steady
//! slot set (or nothing), so a test can script a few failures in front of
//! a stable site.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use courtwatch_core::{ScrapeError, Scraper, Slot, Venue, VenueId};

type ScrapeResult = Result<Vec<Slot>, ScrapeError>;

#[derive(Default)]
pub struct MockScraper {
    scripted: Mutex<HashMap<VenueId, VecDeque<ScrapeResult>>>,
    steady: Mutex<HashMap<VenueId, Vec<Slot>>>,
    calls: Mutex<Vec<VenueId>>,
    delay: Mutex<Option<Duration>>,
}

impl MockScraper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one result for the next scrape of `venue_id`.
    pub async fn push(&self, venue_id: &VenueId, result: ScrapeResult) {
        self.scripted
            .lock()
            .await
            .entry(venue_id.clone())
            .or_default()
            .push_back(result);
    }

    /// Slots returned for `venue_id` once its scripted results run out.
    pub async fn set_slots(&self, venue_id: &VenueId, slots: Vec<Slot>) {
        self.steady.lock().await.insert(venue_id.clone(), slots);
    }

    /// Sleep this long inside every scrape (for timeout tests).
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().await = delay;
    }

    /// Venues scraped so far, in call order.
    pub async fn calls(&self) -> Vec<VenueId> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl Scraper for MockScraper {
    fn name(&self) -> &str {
        "mock-scraper"
    }

    async fn scrape(&self, venue: &Venue) -> Result<Vec<Slot>, ScrapeError> {
        self.calls.lock().await.push(venue.id.clone());
        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripted
            .lock()
            .await
            .get_mut(&venue.id)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(result) => result,
            None => Ok(self
                .steady
                .lock()
                .await
                .get(&venue.id)
                .cloned()
                .unwrap_or_default()),
        }
    }
}
