// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot operator commands: `tick`, `pause`, `resume`, `retention run`
//! and `dead-letters`. Each acts on the store directly, so they work
//! alongside a running `serve` process.

use std::sync::Arc;

use courtwatch_agent::sync_from_config;
use courtwatch_config::CourtwatchConfig;
use courtwatch_core::{Clock, CourtwatchError, SystemClock, TaskId};
use courtwatch_cron::{RetentionService, Scheduler};
use courtwatch_queue::TaskQueue;
use courtwatch_storage::{Database, RequeueOutcome};

/// Store handles shared by every command.
pub struct Admin {
    pub db: Database,
    pub clock: Arc<dyn Clock>,
    pub queue: TaskQueue,
    config: CourtwatchConfig,
}

impl Admin {
    pub async fn open(config: &CourtwatchConfig) -> Result<Self, CourtwatchError> {
        let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
        Ok(Self::with_database(db, config, Arc::new(SystemClock)))
    }

    pub fn with_database(db: Database, config: &CourtwatchConfig, clock: Arc<dyn Clock>) -> Self {
        let queue = TaskQueue::new(db.clone(), &config.queue, clock.clone());
        Self {
            db,
            clock,
            queue,
            config: config.clone(),
        }
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.db.clone(), self.queue.clone(), self.clock.clone())
    }

    /// Sync config, then run a single scheduler pass.
    pub async fn tick(&self) -> Result<(), CourtwatchError> {
        sync_from_config(&self.db, &self.config, self.clock.now()).await?;
        let report = self.scheduler().tick().await?;
        if report.paused {
            println!("scheduler is paused; nothing enqueued");
            return Ok(());
        }
        for (venue_id, task_id) in &report.enqueued {
            println!("enqueued {venue_id} as task {task_id}");
        }
        println!(
            "{} enqueued, {} not due, {} outstanding, {} inactive",
            report.enqueued.len(),
            report.not_due,
            report.outstanding,
            report.inactive
        );
        for (venue_id, error) in &report.errors {
            eprintln!("error: {venue_id}: {error}");
        }
        Ok(())
    }

    pub async fn set_paused(&self, paused: bool) -> Result<(), CourtwatchError> {
        let scheduler = self.scheduler();
        if paused {
            scheduler.pause().await?;
            println!("scheduler paused");
        } else {
            scheduler.resume().await?;
            println!("scheduler resumed");
        }
        Ok(())
    }

    pub async fn retention_run(&self, dry_run: bool, json: bool) -> Result<(), CourtwatchError> {
        let service = RetentionService::new(self.db.clone(), &self.config.retention, self.clock.clone());
        let report = service.run_with(dry_run || self.config.retention.dry_run).await?;
        if json {
            let rendered = serde_json::to_string_pretty(&report)
                .map_err(|e| CourtwatchError::Internal(format!("failed to encode report: {e}")))?;
            println!("{rendered}");
            return Ok(());
        }

        let verb = if report.dry_run { "would delete" } else { "deleted" };
        println!("retention run{}", if report.dry_run { " (dry run)" } else { "" });
        println!("  cutoff:                 {}", report.cutoff.to_rfc3339());
        println!("  active preferences:     {}", report.active_preferences);
        println!("  scanned:                {}", report.scanned);
        println!("  kept (preference):      {}", report.retained_by_preference);
        println!("  kept (live alert):      {}", report.retained_by_alert);
        println!("  {verb:<23} {} observations", report.deleted);
        println!("  {verb:<23} {} scrape logs", report.logs_deleted);
        println!("  {verb:<23} {} alert records", report.alerts_purged);
        println!("  errors:                 {}", report.errors);
        println!("  duration:               {}ms", report.duration().num_milliseconds());
        for anomaly in &report.anomalies {
            eprintln!("warning: {anomaly}");
        }
        Ok(())
    }

    pub async fn dead_letters(&self, json: bool) -> Result<(), CourtwatchError> {
        let tasks = self.queue.dead_letters().await?;
        if json {
            let rendered = serde_json::to_string_pretty(&tasks)
                .map_err(|e| CourtwatchError::Internal(format!("failed to encode tasks: {e}")))?;
            println!("{rendered}");
            return Ok(());
        }
        if tasks.is_empty() {
            println!("no dead-lettered tasks");
            return Ok(());
        }
        for task in &tasks {
            println!(
                "{}  {}  attempts={}  at={}  {}",
                task.id,
                task.venue_id,
                task.attempts,
                task.dead_lettered_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
                task.last_error.as_deref().unwrap_or("")
            );
        }
        Ok(())
    }

    pub async fn requeue(&self, id: &str) -> Result<(), CourtwatchError> {
        let task_id = TaskId(id.to_string());
        match self.queue.requeue_dead_letter(&task_id).await? {
            RequeueOutcome::Requeued => {
                println!("task {task_id} requeued");
                Ok(())
            }
            RequeueOutcome::NotFound => Err(CourtwatchError::NotFound {
                kind: "dead-lettered task",
                id: id.to_string(),
            }),
            RequeueOutcome::VenueBusy { task_id: busy } => Err(CourtwatchError::Internal(format!(
                "venue already has outstanding task {busy}; retry once it completes"
            ))),
        }
    }
}
