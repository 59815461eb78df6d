//! Best-effort operator alerting. Failures to deliver an alert are logged
//! and swallowed; nothing in the request path ever waits on or fails from
//! an alert.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

#[async_trait]
pub trait Alerter: Send + Sync {
    async fn notify(&self, recipient: &str, subject: &str, body: &str);
}

/// Posts alerts as JSON to an operations webhook.
pub struct WebhookAlerter {
    client: Client,
    webhook_url: String,
}

impl WebhookAlerter {
    pub fn new(webhook_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        WebhookAlerter {
            client,
            webhook_url: webhook_url.to_string(),
        }
    }
}

#[async_trait]
impl Alerter for WebhookAlerter {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) {
        log::debug!("sending alert to {}: {}", recipient, subject);

        let payload = json!({
            "recipient": recipient,
            "subject": subject,
            "body": body,
        });

        match self.client.post(&self.webhook_url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                log::error!(
                    "alert webhook returned {} for '{}'",
                    response.status(),
                    subject
                );
            }
            Err(e) => {
                log::error!("failed to deliver alert '{}': {}", subject, e);
            }
        }
    }
}

/// Fallback when no webhook is configured: alerts land in the log only.
pub struct LogAlerter;

#[async_trait]
impl Alerter for LogAlerter {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) {
        log::warn!("[ALERT to {}] {}: {}", recipient, subject, body);
    }
}
