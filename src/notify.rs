//! Notification delivery.
//!
//! The engine only knows the [`Notifier`] capability; delivery failures
//! are logged and swallowed so a broken chat bot can never block a
//! cost-control action.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, instrument, trace};

use crate::config::TelegramConfig;

/// How a message should be presented to the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Good news: recovery, back to normal.
    Ok,
    /// Something needs attention.
    Alert,
}

impl Severity {
    fn icon(&self) -> &'static str {
        match self {
            Severity::Ok => "\u{2705}",
            Severity::Alert => "\u{1f6a8}",
        }
    }
}

/// Capability interface for delivering a titled message.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str, severity: Severity);
}

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Sends messages through the Telegram Bot API.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> TelegramNotifier {
        Self::with_api_base(config, TELEGRAM_API)
    }

    /// Overridable API base, primarily for tests against a mock server.
    pub fn with_api_base(config: &TelegramConfig, api_base: &str) -> TelegramNotifier {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(skip(self, body))]
    async fn notify(&self, title: &str, body: &str, severity: Severity) {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let text = format!("{} *[{}]*\n\n{}", severity.icon(), title, body);
        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        match self.client.post(&url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("sent telegram notification: {title}");
                } else {
                    error!(
                        "telegram notification failed with status: {}",
                        response.status()
                    );
                }
            }
            Err(e) => {
                error!("failed to send telegram notification: {e}");
            }
        }
    }
}

/// Used when no notifier credentials are configured. Dropping the
/// message silently is the documented behavior, not an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, title: &str, _body: &str, _severity: Severity) {
        trace!("no notifier configured, dropping message: {title}");
    }
}
