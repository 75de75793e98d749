use std::time::Duration;

use async_trait::async_trait;

use crate::config::NtfySettings;
use crate::error::{AppError, Result};
use crate::types::TicketListing;

use super::{render_message, Notifier, RenderOptions};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Sends a message per listing to an ntfy topic. The event name travels
/// in the title header and the buy link as the click action, so the body
/// carries neither.
pub struct NtfyClient {
    client: reqwest::Client,
    settings: NtfySettings,
}

impl NtfyClient {
    pub fn new(settings: NtfySettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, settings })
    }

    fn topic_url(&self) -> String {
        format!("{}/{}", self.settings.url.trim_end_matches('/'), self.settings.topic)
    }
}

#[async_trait]
impl Notifier for NtfyClient {
    async fn send_listing(&self, listing: &TicketListing) -> Result<()> {
        let body = render_message(listing, RenderOptions { header: false, footer: false });

        let mut request = self
            .client
            .post(self.topic_url())
            .header("X-Title", listing.event.name.clone())
            .header("X-Click", listing.url())
            .header("X-Markdown", "yes")
            .body(body);

        if let Some(username) = &self.settings.username {
            request = request.basic_auth(username, self.settings.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Notify(format!("ntfy returned HTTP {status}")));
        }
        Ok(())
    }
}
