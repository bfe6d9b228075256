//! Operator alerts.
//!
//! Alerts are best-effort: `notify` never blocks the caller and delivery
//! failures are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{VenueError, VenueResult};

/// Best-effort, non-blocking notification sink.
pub trait AlertSink: Send + Sync {
    fn notify(&self, message: String);
}

/// Arc wrapper for AlertSink trait objects.
pub type DynAlertSink = Arc<dyn AlertSink>;

/// Webhook delivery timeout.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Posts alerts as `{"text": ...}` to a webhook URL.
///
/// Each alert is delivered on its own task; must be used inside a tokio runtime.
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: Arc<str>,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>) -> VenueResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| {
                VenueError::HttpClient(format!("Failed to create webhook client: {e}"))
            })?;
        Ok(Self {
            client,
            url: Arc::from(url.into()),
        })
    }
}

impl AlertSink for WebhookAlertSink {
    fn notify(&self, message: String) {
        let client = self.client.clone();
        let url = Arc::clone(&self.url);
        tokio::spawn(async move {
            let payload = WebhookPayload { text: &message };
            match client.post(url.as_ref()).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => debug!(status = %response.status(), "Webhook alert rejected"),
                Err(e) => debug!(error = %e, "Webhook alert failed"),
            }
        });
    }
}

/// Writes alerts to the log. Used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, message: String) {
        info!(alert = %message, "Alert");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let payload = WebhookPayload { text: "[trigger]: hello" };
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"text":"[trigger]: hello"}"#
        );
    }

    #[tokio::test]
    async fn test_webhook_failure_is_swallowed() {
        // Nothing listens on port 9; delivery fails on the spawned task only.
        let sink = WebhookAlertSink::new("http://127.0.0.1:9/hook").unwrap();
        sink.notify("unreachable".to_string());
        tokio::task::yield_now().await;
    }
}
