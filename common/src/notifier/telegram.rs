// Telegram Bot API notification sink

use crate::config::{NotifierConfig, TelegramConfig};
use crate::errors::NotifyError;
use crate::models::Notification;
use crate::notifier::sink::{item_markdown, NotificationSink};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

/// Sink posting item cards through `sendMessage`
pub struct TelegramSink {
    client: Client,
    send_url: String,
    link_base: String,
}

impl TelegramSink {
    pub fn new(
        telegram: &TelegramConfig,
        token: &str,
        link_base: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(telegram.timeout_seconds))
            .build()
            .map_err(|e| NotifyError::DeliveryFailed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            send_url: format!(
                "{}/bot{}/sendMessage",
                telegram.api_base.trim_end_matches('/'),
                token
            ),
            link_base: link_base.into(),
        })
    }

    /// Build the sink from notifier settings
    pub fn from_config(config: &NotifierConfig) -> Result<Self, NotifyError> {
        let token = config
            .telegram
            .token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| NotifyError::DeliveryFailed("Telegram token is not configured".to_string()))?;

        Self::new(&config.telegram, token, config.item_link_base.clone())
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    #[instrument(skip(self, notification), fields(
        user_id = notification.user.id,
        item_id = %notification.item.id
    ))]
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let text = item_markdown(&notification.item, &self.link_base);
        let body = SendMessage {
            chat_id: notification.user.chat_id,
            text: &text,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&self.send_url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Telegram message sent");
        Ok(())
    }
}
