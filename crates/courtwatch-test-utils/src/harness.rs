// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the full pipeline (scheduler, queue, workers,
//! detection, dispatch, retention) over a temp SQLite database with a
//! scripted scraper, a recording notifier and a manual clock. Tests drive
//! it step by step with `tick()`, `drain()` and `advance()`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use courtwatch_agent::{Runtime, WorkOutcome, Worker};
use courtwatch_config::model::CourtwatchConfig;
use courtwatch_core::CourtwatchError;
use courtwatch_cron::{RetentionService, Scheduler, TickReport};
use courtwatch_queue::TaskQueue;
use courtwatch_storage::Database;

use crate::clock::{fixed_start, ManualClock};
use crate::mock_scraper::MockScraper;
use crate::recording_notifier::RecordingNotifier;

/// Upper bound on tasks one `drain()` will process, so a test bug that
/// keeps re-enqueueing cannot spin forever.
const MAX_DRAIN: usize = 1000;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config_toml: Option<String>,
    config: Option<CourtwatchConfig>,
    start: DateTime<Utc>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config_toml: None,
            config: None,
            start: fixed_start(),
        }
    }

    /// Configuration as TOML, parsed at build time.
    pub fn with_config_toml(mut self, toml_src: &str) -> Self {
        self.config_toml = Some(toml_src.to_string());
        self
    }

    pub fn with_config(mut self, config: CourtwatchConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Initial reading of the manual clock.
    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    /// Build the harness and sync the configured venues and users.
    pub async fn build(self) -> Result<TestHarness, CourtwatchError> {
        let mut config = match (self.config, self.config_toml) {
            (Some(config), _) => config,
            (None, Some(src)) => toml::from_str(&src)
                .map_err(|e| CourtwatchError::Config(format!("invalid test config: {e}")))?,
            (None, None) => CourtwatchConfig::default(),
        };

        let temp_dir = tempfile::TempDir::new().map_err(CourtwatchError::storage)?;
        let db_path = temp_dir.path().join("courtwatch.db");
        config.storage.database_path = db_path.to_string_lossy().to_string();
        let db = Database::open(&config.storage.database_path).await?;

        let clock = Arc::new(ManualClock::new(self.start));
        let scraper = Arc::new(MockScraper::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let runtime = Runtime::new(
            db.clone(),
            config.clone(),
            scraper.clone(),
            notifier.clone(),
            clock.clone(),
        );
        runtime.sync().await?;

        Ok(TestHarness {
            db,
            clock,
            scraper,
            notifier,
            config,
            runtime,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment over a temp database.
pub struct TestHarness {
    /// Database (temp file, removed on drop).
    pub db: Database,
    pub clock: Arc<ManualClock>,
    pub scraper: Arc<MockScraper>,
    pub notifier: Arc<RecordingNotifier>,
    pub config: CourtwatchConfig,
    pub runtime: Runtime,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn queue(&self) -> &TaskQueue {
        self.runtime.queue()
    }

    pub fn scheduler(&self) -> Scheduler {
        self.runtime.scheduler()
    }

    pub fn worker(&self, id: &str) -> Worker {
        self.runtime.worker(id)
    }

    pub fn retention(&self) -> RetentionService {
        self.runtime.retention()
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.clock.advance(by);
    }

    /// One scheduler pass.
    pub async fn tick(&self) -> Result<TickReport, CourtwatchError> {
        self.scheduler().tick().await
    }

    /// Process ready tasks with a single worker until none are left.
    ///
    /// Tasks waiting out a backoff delay are not ready; advance the clock
    /// to reach them.
    pub async fn drain(&self) -> Result<Vec<WorkOutcome>, CourtwatchError> {
        let worker = self.worker("harness-worker");
        let mut outcomes = Vec::new();
        for _ in 0..MAX_DRAIN {
            match worker.process_one().await? {
                WorkOutcome::Idle => break,
                outcome => outcomes.push(outcome),
            }
        }
        Ok(outcomes)
    }

    /// `tick()` followed by `drain()`.
    pub async fn cycle(&self) -> Result<Vec<WorkOutcome>, CourtwatchError> {
        self.tick().await?;
        self.drain().await
    }
}
