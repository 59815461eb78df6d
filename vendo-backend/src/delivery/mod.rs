pub mod whatsapp;

pub use whatsapp::WhatsAppSender;

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Outbound message channel. Implementations own their bounded retry and
/// alert the operator when every attempt fails; callers never surface a
/// delivery fault to the end user.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send(&self, body: &str, from: &str, to: &str) -> Result<(), String>;
}

/// Bounded exponential backoff applied at the delivery boundary.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following attempt `attempt` (1-based):
    /// base, 2x base, 4x base, ... plus up to half the base of jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let mut delay = self.base_delay.saturating_mul(1 << exponent);
        if self.jitter {
            let max_jitter = (self.base_delay.as_millis() as u64 / 2).max(1);
            delay += Duration::from_millis(rand::thread_rng().gen_range(0..max_jitter));
        }
        delay
    }
}
