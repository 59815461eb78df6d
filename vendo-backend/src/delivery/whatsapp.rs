use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::alerts::Alerter;
use crate::delivery::{DeliveryChannel, RetryPolicy};

const API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// WhatsApp sender over the Twilio messaging REST API.
pub struct WhatsAppSender {
    client: Client,
    account_sid: String,
    auth_token: String,
    policy: RetryPolicy,
    alerter: Arc<dyn Alerter>,
    alert_recipient: String,
}

impl WhatsAppSender {
    pub fn new(
        account_sid: &str,
        auth_token: &str,
        policy: RetryPolicy,
        alerter: Arc<dyn Alerter>,
        alert_recipient: &str,
    ) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(WhatsAppSender {
            client,
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            policy,
            alerter,
            alert_recipient: alert_recipient.to_string(),
        })
    }

    async fn attempt(&self, body: &str, from: &str, to: &str) -> Result<(), String> {
        let url = format!("{}/Accounts/{}/Messages.json", API_BASE, self.account_sid);
        let form = [
            ("From", format!("whatsapp:+{}", from)),
            ("To", format!("whatsapp:+{}", to)),
            ("Body", body.to_string()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let error_body = response.text().await.unwrap_or_default();
        Err(format!("API returned {}: {}", status, error_body))
    }
}

#[async_trait]
impl DeliveryChannel for WhatsAppSender {
    async fn send(&self, body: &str, from: &str, to: &str) -> Result<(), String> {
        log::debug!("sending WhatsApp message to {}", to);

        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts {
            match self.attempt(body, from, to).await {
                Ok(()) => {
                    log::info!("Bot -> {}: {}", to, body);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("attempt {} to message {} failed: {}", attempt, to, e);
                    last_error = e;
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    }
                }
            }
        }

        log::error!("all attempts to message {} failed", to);
        self.alerter
            .notify(
                &self.alert_recipient,
                &format!("WhatsApp delivery failed from {} to {}", from, to),
                &format!("Mensaje: {}\nError: {}", body, last_error),
            )
            .await;

        Err(last_error)
    }
}
