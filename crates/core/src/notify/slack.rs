//! Slack webhook notification sender.

use tracing::{debug, info, warn};

use crate::errors::NotificationError;

/// Slack incoming-webhook notifier.
pub struct SlackNotifier {
    webhook_url: String,
    http: reqwest::Client,
}

impl SlackNotifier {
    /// Create a new Slack notifier targeting the given webhook URL.
    pub fn new(webhook_url: String) -> Self {
        Self::with_client(webhook_url, reqwest::Client::new())
    }

    /// Same as [`SlackNotifier::new`], reusing an existing HTTP client.
    pub fn with_client(webhook_url: String, http: reqwest::Client) -> Self {
        info!("initializing Slack notifier");
        Self { webhook_url, http }
    }

    /// Post `message` as a plain `text` payload (Slack mrkdwn applies).
    pub async fn send_message(&self, message: &str) -> Result<(), NotificationError> {
        debug!(len = message.len(), "sending Slack message");

        let payload = serde_json::json!({
            "text": message,
            "unfurl_links": false,
            "unfurl_media": false,
        });

        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(NotificationError::HttpError)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Slack webhook returned error");
            return Err(NotificationError::SlackError(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        info!("Slack message sent");
        Ok(())
    }
}
