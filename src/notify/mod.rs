//! Notification channel module
//!
//! Delivers formatted alert messages. A failed send is reported as `false`
//! and never retried within the same pass.

mod format;
mod telegram;

pub use format::{format_alert_message, format_test_message, html_escape};
pub use telegram::TelegramNotifier;

use async_trait::async_trait;

/// Trait for notification channel implementations
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message; `true` only when the channel accepted it
    async fn send(&self, message: &str) -> bool;
}

/// Notifier that only logs, used when the channel is disabled
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> bool {
        tracing::info!(chars = message.len(), "Notification channel disabled, logging message");
        tracing::debug!(%message, "Suppressed notification");
        true
    }
}
