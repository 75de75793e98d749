use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::config::TelegramSettings;
use crate::error::{AppError, Result};
use crate::types::TicketListing;

use super::{render_message, Notifier, RenderOptions};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const TELEGRAM_API_URL: &str = "https://api.telegram.org";

pub struct TelegramClient {
    client: reqwest::Client,
    settings: TelegramSettings,
    base_url: String,
}

impl TelegramClient {
    pub fn new(settings: TelegramSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, settings, base_url: TELEGRAM_API_URL.to_string() })
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send_listing(&self, listing: &TicketListing) -> Result<()> {
        // Telegram has no separate title or click action; everything goes
        // in the message body.
        let text = render_message(listing, RenderOptions { header: true, footer: true });

        let url = format!("{}/bot{}/sendMessage", self.base_url, self.settings.token);
        let payload = json!({
            "chat_id": self.settings.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Notify(format!("telegram returned HTTP {status}")));
        }
        Ok(())
    }
}
