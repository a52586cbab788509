use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::constants::errors::{RECENT_CAPTURE_LIMIT, WEBHOOK_TIMEOUT_SECONDS};
use crate::errors::MonitorError;

/// Context attached to a captured failure, e.g. `address` and `operation`
pub type Tags = BTreeMap<String, String>;

pub fn tags<const N: usize>(pairs: [(&str, &str); N]) -> Tags {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorCapture {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub tags: Tags,
}

/// Collects unexpected failures from discovery, watchers and identity lookups.
///
/// Every capture is logged and kept in a bounded in-memory list. When a
/// webhook is configured the capture is also posted there in the background;
/// delivery failures are logged and otherwise ignored.
#[derive(Clone)]
pub struct ErrorTracker {
    webhook_url: Option<String>,
    client: Client,
    recent: Arc<Mutex<VecDeque<ErrorCapture>>>,
}

impl ErrorTracker {
    pub fn new(webhook_url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECONDS))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client for error tracker: {}", e);
                Client::new()
            });

        Self {
            webhook_url: webhook_url.filter(|url| !url.is_empty()),
            client,
            recent: Arc::new(Mutex::new(VecDeque::with_capacity(RECENT_CAPTURE_LIMIT))),
        }
    }

    /// Tracker that only logs and remembers
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Record a failure. Never blocks on the webhook.
    pub fn capture(&self, err: &MonitorError, tags: Tags) -> ErrorCapture {
        let capture = self.remember(err, tags);

        if self.webhook_url.is_some() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let tracker = self.clone();
                    let payload = capture.clone();
                    handle.spawn(async move { tracker.send_webhook(&payload).await });
                }
                Err(_) => debug!("No runtime available, webhook skipped for captured error"),
            }
        }
        capture
    }

    /// Record a failure and wait for webhook delivery
    pub async fn report(&self, err: &MonitorError, tags: Tags) -> ErrorCapture {
        let capture = self.remember(err, tags);
        self.send_webhook(&capture).await;
        capture
    }

    /// Most recent captures, oldest first
    pub fn recent(&self) -> Vec<ErrorCapture> {
        self.recent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn remember(&self, err: &MonitorError, tags: Tags) -> ErrorCapture {
        error!(?tags, "{}", err);

        let capture = ErrorCapture {
            timestamp: Utc::now(),
            message: err.to_string(),
            tags,
        };

        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        if recent.len() == RECENT_CAPTURE_LIMIT {
            recent.pop_front();
        }
        recent.push_back(capture.clone());
        capture
    }

    async fn send_webhook(&self, payload: &ErrorCapture) {
        let Some(url) = self.webhook_url.as_deref() else {
            debug!("No webhook URL configured, skipping error report");
            return;
        };

        match timeout(
            Duration::from_secs(WEBHOOK_TIMEOUT_SECONDS),
            self.client.post(url).json(payload).send(),
        )
        .await
        {
            Ok(Ok(response)) => {
                if response.status().is_success() {
                    info!("Error report delivered: {}", payload.message);
                } else {
                    warn!("Error webhook returned status: {}", response.status());
                }
            }
            Ok(Err(e)) => warn!("Failed to deliver error report: {}", e),
            Err(_) => warn!("Error webhook timeout"),
        }
    }
}
