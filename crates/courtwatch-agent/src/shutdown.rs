// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown coordination with signal handling.
//!
//! Installs handlers for SIGTERM and SIGINT (Ctrl+C), triggering a
//! [`CancellationToken`] that every background loop monitors. Loops stop
//! taking new work on cancellation and are given a grace period to finish
//! what they hold before being aborted.

use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            info!("received SIGINT (Ctrl+C), initiating shutdown");
                        }
                        _ = sigterm.recv() => {
                            info!("received SIGTERM, initiating shutdown");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler, listening for Ctrl+C only");
                    let _ = ctrl_c.await;
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// How a drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every task finished within the grace period.
    Drained,
    /// The grace period ran out; this many tasks were aborted.
    Aborted { remaining: usize },
}

/// Waits up to `grace` for `handles` to finish, then aborts the rest.
///
/// Callers cancel the loops' token first; this only waits.
pub async fn drain_tasks(mut handles: Vec<JoinHandle<()>>, grace: Duration) -> DrainOutcome {
    if handles.is_empty() {
        return DrainOutcome::Drained;
    }
    info!(tasks = handles.len(), grace_secs = grace.as_secs(), "draining background tasks");

    let finished = tokio::time::timeout(grace, join_all(handles.iter_mut())).await;
    match finished {
        Ok(results) => {
            for e in results.into_iter().filter_map(Result::err) {
                if e.is_panic() {
                    warn!(error = %e, "background task panicked");
                }
            }
            info!("all background tasks drained");
            DrainOutcome::Drained
        }
        Err(_) => {
            let remaining = handles.iter().filter(|h| !h.is_finished()).count();
            for handle in &handles {
                handle.abort();
            }
            warn!(remaining, "grace period elapsed, aborting in-flight work");
            DrainOutcome::Aborted { remaining }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_signal_handler_returns_token() {
        let token = install_signal_handler();
        assert!(!token.is_cancelled());
        token.cancel();
    }

    #[tokio::test]
    async fn drain_empty_is_immediate() {
        assert_eq!(
            drain_tasks(Vec::new(), Duration::from_millis(10)).await,
            DrainOutcome::Drained
        );
    }

    #[tokio::test]
    async fn cooperative_tasks_drain() {
        let cancel = CancellationToken::new();
        let handles = (0..3)
            .map(|_| {
                let cancel = cancel.clone();
                tokio::spawn(async move { cancel.cancelled().await })
            })
            .collect();
        cancel.cancel();
        assert_eq!(
            drain_tasks(handles, Duration::from_secs(5)).await,
            DrainOutcome::Drained
        );
    }

    #[tokio::test]
    async fn stuck_tasks_are_aborted_after_grace() {
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let done = tokio::spawn(async {});
        tokio::task::yield_now().await;
        let outcome = drain_tasks(vec![stuck, done], Duration::from_millis(20)).await;
        assert_eq!(outcome, DrainOutcome::Aborted { remaining: 1 });
    }
}
