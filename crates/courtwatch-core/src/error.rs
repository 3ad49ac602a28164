// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for Courtwatch.

use thiserror::Error;

/// The primary error type used across all Courtwatch crates.
///
/// Expected outcomes of the alerting path (duplicate suppression, rate
/// limiting, quiet hours) are not errors and never appear here.
#[derive(Debug, Error)]
pub enum CourtwatchError {
    /// Configuration errors (invalid TOML, bad values, unknown venues).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The scraper collaborator failed for a venue.
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    /// The task queue could not accept or hand out work.
    #[error("task queue unavailable: {source}")]
    QueueUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The notifier collaborator failed to deliver an alert.
    #[error("notifier error: {message}")]
    Notifier {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourtwatchError {
    /// Wrap any error as a storage error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(err),
        }
    }

    /// Reclassify a storage failure as queue unavailability.
    ///
    /// Other variants pass through unchanged.
    pub fn into_queue_unavailable(self) -> Self {
        match self {
            Self::Storage { source } => Self::QueueUnavailable { source },
            other => other,
        }
    }
}

/// Failure classification returned by the scraper collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScrapeError {
    /// Network failure, timeout, rate limiting by the site. Retried with backoff.
    #[error("transient scrape failure: {0}")]
    Transient(String),

    /// The site structure changed or the venue config is unusable.
    /// Goes straight to the dead-letter lane.
    #[error("permanent scrape failure: {0}")]
    Permanent(String),
}

impl ScrapeError {
    /// Whether the task that produced this error should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// The human-readable reason without the classification prefix.
    pub fn reason(&self) -> &str {
        match self {
            Self::Transient(reason) | Self::Permanent(reason) => reason,
        }
    }
}
