// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process runtime: wires the components together and runs the
//! scheduler loop, the worker pool and the retention loop until shutdown.

use std::sync::Arc;
use std::time::Duration;

use courtwatch_alerts::{AlertDispatcher, DedupLedger, RateLimiter};
use courtwatch_config::model::CourtwatchConfig;
use courtwatch_core::{Clock, CourtwatchError, Notifier, Scraper};
use courtwatch_cron::{RetentionService, Scheduler};
use courtwatch_queue::TaskQueue;
use courtwatch_storage::Database;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::shutdown::{self, DrainOutcome};
use crate::sync::{self, SyncReport};
use crate::worker::Worker;

pub struct Runtime {
    db: Database,
    config: CourtwatchConfig,
    clock: Arc<dyn Clock>,
    queue: TaskQueue,
    scraper: Arc<dyn Scraper>,
    dispatcher: Arc<AlertDispatcher>,
}

impl Runtime {
    pub fn new(
        db: Database,
        config: CourtwatchConfig,
        scraper: Arc<dyn Scraper>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let queue = TaskQueue::new(db.clone(), &config.queue, clock.clone());
        let dispatcher = Arc::new(AlertDispatcher::new(
            db.clone(),
            DedupLedger::new(db.clone(), &config.alerts, clock.clone()),
            RateLimiter::new(db.clone(), clock.clone()),
            notifier,
            &config.alerts,
        ));
        Self {
            db,
            config,
            clock,
            queue,
            scraper,
            dispatcher,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &CourtwatchConfig {
        &self.config
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.db.clone(), self.queue.clone(), self.clock.clone())
    }

    pub fn worker(&self, id: impl Into<String>) -> Worker {
        Worker::new(
            id,
            self.queue.clone(),
            self.scraper.clone(),
            self.dispatcher.clone(),
            &self.config.worker,
        )
    }

    pub fn retention(&self) -> RetentionService {
        RetentionService::new(self.db.clone(), &self.config.retention, self.clock.clone())
    }

    /// Push configured venues and users into the store.
    pub async fn sync(&self) -> Result<SyncReport, CourtwatchError> {
        sync::sync_from_config(&self.db, &self.config, self.clock.now()).await
    }

    /// Sync config, start every loop, and block until `cancel` fires.
    ///
    /// On cancellation the loops stop taking new work and are given
    /// `worker.shutdown_grace_secs` to finish; whatever is still running
    /// after that is aborted. Aborted tasks keep their leases, which expire
    /// and are redelivered by the next process.
    pub async fn run(&self, cancel: CancellationToken) -> Result<DrainOutcome, CourtwatchError> {
        self.sync().await?;

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        handles.push(self.spawn_scheduler(cancel.clone()));
        let concurrency = self.config.worker.concurrency.max(1);
        for n in 0..concurrency {
            let worker = self.worker(format!("worker-{n}"));
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move { worker.run(cancel).await }));
        }
        handles.push(self.spawn_retention(cancel.clone()));
        info!(
            workers = concurrency,
            tick_secs = self.config.scheduler.tick_seconds,
            retention_interval_hours = self.config.retention.interval_hours,
            "runtime started"
        );

        cancel.cancelled().await;
        info!("shutdown requested, draining");
        let grace = Duration::from_secs(self.config.worker.shutdown_grace_secs);
        let outcome = shutdown::drain_tasks(handles, grace).await;
        info!(?outcome, "runtime stopped");
        Ok(outcome)
    }

    fn spawn_scheduler(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.scheduler();
        let period = Duration::from_secs(self.config.scheduler.tick_seconds.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match scheduler.tick().await {
                            Ok(report) if !report.enqueued.is_empty() => {
                                debug!(enqueued = report.enqueued.len(), "scheduler tick");
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "scheduler tick failed (non-fatal)"),
                        }
                    }
                    _ = cancel.cancelled() => {
                        info!("scheduler loop shutting down");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_retention(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let retention = self.retention();
        let period = Duration::from_secs(self.config.retention.interval_hours.max(1) * 3600);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Skip the immediate first tick; the first run happens one period in.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = retention.run().await {
                            warn!(error = %e, "retention run failed (non-fatal)");
                        }
                    }
                    _ = cancel.cancelled() => {
                        info!("retention loop shutting down");
                        break;
                    }
                }
            }
        })
    }
}
