// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bundled notifiers: a JSON webhook and a log-only fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courtwatch_config::model::NotifierConfig;
use courtwatch_core::{Alert, CourtwatchError, Notifier};
use tracing::{debug, info};

/// POSTs each alert as JSON to a fixed URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self, CourtwatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CourtwatchError::Notifier {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, alert: &Alert) -> Result<(), CourtwatchError> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|e| CourtwatchError::Notifier {
                message: format!("webhook request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(status = %status, user_id = %alert.user_id, "webhook responded");
        if status.is_success() {
            Ok(())
        } else {
            Err(CourtwatchError::Notifier {
                message: format!("webhook returned {status}"),
                source: None,
            })
        }
    }
}

/// Writes alerts to the log. Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, alert: &Alert) -> Result<(), CourtwatchError> {
        info!(
            user_id = %alert.user_id,
            email = %alert.email,
            venue = %alert.venue_name,
            slot_key = %alert.slot.key,
            price = alert.slot.price,
            kind = %alert.kind,
            reason = %alert.reason,
            "court available"
        );
        Ok(())
    }
}

/// Pick the notifier the config asks for.
pub fn from_config(config: &NotifierConfig) -> Result<Arc<dyn Notifier>, CourtwatchError> {
    match config.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(Arc::new(WebhookNotifier::new(
            url.to_string(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        _ => Ok(Arc::new(LogNotifier)),
    }
}
