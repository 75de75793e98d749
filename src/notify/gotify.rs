use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::config::GotifySettings;
use crate::error::{AppError, Result};
use crate::types::TicketListing;

use super::{render_message, Notifier, RenderOptions};

const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct GotifyClient {
    client: reqwest::Client,
    settings: GotifySettings,
}

impl GotifyClient {
    pub fn new(settings: GotifySettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl Notifier for GotifyClient {
    async fn send_listing(&self, listing: &TicketListing) -> Result<()> {
        // Gotify shows the title separately; the link goes in the body.
        let body = render_message(listing, RenderOptions { header: false, footer: true });

        let url = format!("{}/message", self.settings.url.trim_end_matches('/'));
        let payload = json!({
            "title": listing.event.name,
            "message": body,
            "priority": 5,
            "extras": {
                "client::display": { "contentType": "text/markdown" }
            }
        });

        let response = self
            .client
            .post(&url)
            .query(&[("token", self.settings.token.as_str())])
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Notify(format!("gotify returned HTTP {status}")));
        }
        Ok(())
    }
}
