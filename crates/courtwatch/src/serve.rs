// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courtwatch serve` command implementation.
//!
//! Opens the store, builds the scraper and notifier from config and runs the
//! scheduler, worker and retention loops until SIGTERM or Ctrl-C. In-flight
//! scrapes get `worker.shutdown_grace_secs` to finish before their leases are
//! abandoned for redelivery on the next start.

use std::sync::Arc;
use std::time::Duration;

use courtwatch_agent::{install_signal_handler, DrainOutcome, Runtime};
use courtwatch_config::model::LoggingConfig;
use courtwatch_config::CourtwatchConfig;
use courtwatch_core::{CourtwatchError, Scraper, SystemClock};
use courtwatch_storage::Database;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::notifier;
use crate::scraper::CommandScraper;

/// How often the memory reporter samples allocator stats.
const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_secs(60);

/// Runs the `courtwatch serve` command.
pub async fn run_serve(config: CourtwatchConfig) -> Result<(), CourtwatchError> {
    info!(
        venues = config.venues.len(),
        users = config.users.len(),
        workers = config.worker.concurrency,
        "starting courtwatch serve"
    );

    let scraper = CommandScraper::from_config(&config.scraper).ok_or_else(|| {
        CourtwatchError::Config("scraper.command is required for serve".to_string())
    })?;
    let notifier = notifier::from_config(&config.notifier)?;
    info!(
        scraper = scraper.name(),
        notifier = notifier.name(),
        "collaborators ready"
    );

    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
    info!(path = %config.storage.database_path, "database opened");

    let cancel = install_signal_handler();

    {
        let mem_cancel = cancel.clone();
        tokio::spawn(async move {
            memory_monitor(mem_cancel).await;
        });
    }

    let runtime = Runtime::new(
        db.clone(),
        config,
        Arc::new(scraper),
        notifier,
        Arc::new(SystemClock),
    );
    let outcome = runtime.run(cancel).await;

    if let Err(e) = db.close().await {
        warn!(error = %e, "failed to close database cleanly");
    }

    match outcome? {
        DrainOutcome::Drained => info!("courtwatch serve shutdown complete"),
        DrainOutcome::Aborted { remaining } => warn!(
            remaining,
            "shutdown grace elapsed, in-flight tasks will be redelivered on restart"
        ),
    }
    Ok(())
}

/// Periodically logs jemalloc heap stats.
#[cfg(not(target_env = "msvc"))]
async fn memory_monitor(cancel: CancellationToken) {
    let mut interval = tokio::time::interval(MEMORY_SAMPLE_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Stats are cached until the epoch advances.
                if let Err(e) = tikv_jemalloc_ctl::epoch::advance() {
                    debug!(error = %e, "jemalloc epoch advance failed");
                    continue;
                }
                let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
                let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
                debug!(
                    allocated_mb = allocated / (1024 * 1024),
                    resident_mb = resident / (1024 * 1024),
                    "memory usage"
                );
            }
            _ = cancel.cancelled() => {
                debug!("memory monitor shutting down");
                break;
            }
        }
    }
}

#[cfg(target_env = "msvc")]
async fn memory_monitor(cancel: CancellationToken) {
    let _ = MEMORY_SAMPLE_INTERVAL;
    cancel.cancelled().await;
}

/// Initializes the tracing subscriber from the logging config.
///
/// `RUST_LOG` takes precedence over `logging.level`.
pub fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&config.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn default_filter(level: &str) -> String {
    format!("courtwatch={level},warn")
}
