//! Telegram Bot API notifier

use super::Notifier;
use crate::config::{NotifyConfig, TelegramCredentials};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Sends HTML messages to one Telegram chat
pub struct TelegramNotifier {
    base_url: String,
    credentials: TelegramCredentials,
    client: Client,
}

impl TelegramNotifier {
    pub fn new(config: &NotifyConfig, credentials: TelegramCredentials) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            client,
        })
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.credentials.bot_token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) -> bool {
        let params = [
            ("chat_id", self.credentials.chat_id.as_str()),
            ("text", message),
            ("parse_mode", "HTML"),
        ];

        match self.client.post(self.send_url()).form(&params).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Telegram message sent");
                true
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(%status, %body, "Telegram rejected message");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, timeout = e.is_timeout(), "Failed to send Telegram message");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_url() {
        let notifier = TelegramNotifier::new(
            &NotifyConfig {
                base_url: "https://api.telegram.org/".to_string(),
                ..Default::default()
            },
            TelegramCredentials {
                bot_token: "123:abc".to_string(),
                chat_id: "42".to_string(),
            },
        )
        .unwrap();
        assert_eq!(notifier.send_url(), "https://api.telegram.org/bot123:abc/sendMessage");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_failure() {
        let notifier = TelegramNotifier::new(
            &NotifyConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                timeout_secs: 1,
                enabled: true,
            },
            TelegramCredentials {
                bot_token: "t".to_string(),
                chat_id: "c".to_string(),
            },
        )
        .unwrap();
        assert!(!notifier.send("hi").await);
    }
}
