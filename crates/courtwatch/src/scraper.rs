// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scraper that shells out to an external program.
//!
//! The program receives the venue as JSON on stdin and prints a JSON array
//! of slots on stdout:
//!
//! ```json
//! [{"court": "Court 1", "date": "2026-03-14", "start": "18:00", "end": "19:00", "price": 15.0}]
//! ```
//!
//! Exit code 2 or unparseable output is a permanent failure; any other
//! non-zero exit is transient.

use std::process::Stdio;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use courtwatch_config::model::ScraperProcessConfig;
use courtwatch_core::{ScrapeError, Scraper, Slot, SlotKey, Venue};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Exit code a scraper uses to say retrying will not help.
const EXIT_PERMANENT: i32 = 2;

/// Longest stderr excerpt carried into an error message.
const STDERR_EXCERPT: usize = 500;

#[derive(Debug, Deserialize)]
struct ScrapedSlot {
    court: String,
    date: String,
    start: String,
    end: String,
    price: f64,
    #[serde(default = "default_available")]
    available: bool,
}

fn default_available() -> bool {
    true
}

pub struct CommandScraper {
    program: String,
    args: Vec<String>,
}

impl CommandScraper {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `None` when no command is configured.
    pub fn from_config(config: &ScraperProcessConfig) -> Option<Self> {
        config
            .command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| Self::new(c, config.args.clone()))
    }
}

#[async_trait]
impl Scraper for CommandScraper {
    fn name(&self) -> &str {
        &self.program
    }

    async fn scrape(&self, venue: &Venue) -> Result<Vec<Slot>, ScrapeError> {
        let payload = serde_json::to_vec(venue)
            .map_err(|e| ScrapeError::Permanent(format!("cannot encode venue: {e}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    ScrapeError::Permanent(format!("cannot run '{}': {e}", self.program))
                }
                _ => ScrapeError::Transient(format!("cannot run '{}': {e}", self.program)),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A scraper that ignores stdin may exit before reading it.
            if let Err(e) = stdin.write_all(&payload).await {
                debug!(error = %e, "scraper did not read venue payload");
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ScrapeError::Transient(format!("scraper process failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT).collect();
            let message = format!("scraper exited with {}: {excerpt}", output.status);
            return Err(match output.status.code() {
                Some(EXIT_PERMANENT) => ScrapeError::Permanent(message),
                _ => ScrapeError::Transient(message),
            });
        }

        parse_slots(venue, &output.stdout)
    }
}

fn parse_slots(venue: &Venue, stdout: &[u8]) -> Result<Vec<Slot>, ScrapeError> {
    let scraped: Vec<ScrapedSlot> = serde_json::from_slice(stdout)
        .map_err(|e| ScrapeError::Permanent(format!("unparseable scraper output: {e}")))?;

    scraped
        .into_iter()
        .map(|s| {
            let bad = |what: &str, raw: &str| {
                ScrapeError::Permanent(format!("invalid {what} '{raw}' for {}", s.court))
            };
            let date = NaiveDate::parse_from_str(&s.date, "%Y-%m-%d")
                .map_err(|_| bad("date", &s.date))?;
            let start =
                NaiveTime::parse_from_str(&s.start, "%H:%M").map_err(|_| bad("start", &s.start))?;
            let end = NaiveTime::parse_from_str(&s.end, "%H:%M").map_err(|_| bad("end", &s.end))?;
            Ok(Slot {
                key: SlotKey {
                    venue_id: venue.id.clone(),
                    court: s.court,
                    date,
                    start,
                    end,
                },
                price: s.price,
                available: s.available,
            })
        })
        .collect()
}
