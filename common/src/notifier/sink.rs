// Notification sinks and the item message card

use crate::errors::NotifyError;
use crate::models::{Item, Notification};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::info;

// Characters reserved by Telegram MarkdownV2
static MARKDOWN_SPECIAL: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// NotificationSink trait for delivering matches to users
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Escape text for a MarkdownV2 message
pub fn markdown_escape(source: &str) -> String {
    let special = MARKDOWN_SPECIAL.get_or_init(|| Regex::new(r"[\[\]()~`>#+\-=|{}.!_*\\]"));
    match special {
        Ok(special) => special.replace_all(source, r"\$0").into_owned(),
        Err(_) => source.to_string(),
    }
}

/// Replace currency codes with their symbols
pub fn currency_symbol(currency: &str) -> String {
    currency.replace("EUR", "€").replace("USD", "$")
}

/// Render the item card: bold title, bold whole price with currency, item link
pub fn item_markdown(item: &Item, link_base: &str) -> String {
    format!(
        "*{}*\n*{}{}*\n{}/{}",
        markdown_escape(&item.title),
        item.price.trunc() as i64,
        currency_symbol(&item.currency),
        markdown_escape(link_base.trim_end_matches('/')),
        markdown_escape(&item.slug),
    )
}

/// Sink that only logs deliveries
#[derive(Debug, Clone, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            user_id = notification.user.id,
            chat_id = notification.user.chat_id,
            search = %notification.search,
            item_id = %notification.item.id,
            title = %notification.item.title,
            price = notification.item.price,
            "Notification delivered"
        );
        Ok(())
    }
}
