use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::types::TicketListing;

pub const FEED_BASE_URL: &str = "https://www.twickets.live";

const FEED_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Fetch window for one scan cycle, in unix milliseconds. `created_after`
/// is exclusive: listings at or before it have already been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchQuery {
    pub created_after: Option<u64>,
    pub created_before: u64,
    pub max_count: usize,
}

/// The live-feed capability. Implementations must return listings ordered
/// newest-first by creation time.
#[async_trait]
pub trait ListingFeed: Send + Sync {
    async fn fetch_listings(&self, query: FetchQuery) -> Result<Vec<TicketListing>>;
}

/// Live-feed client for the Twickets catalogue endpoint.
pub struct TwicketsFeed {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    country: String,
}

impl TwicketsFeed {
    pub fn new(api_key: String, country: String) -> Result<Self> {
        Self::with_base_url(api_key, country, FEED_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, country: String, base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FEED_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, base_url, api_key, country })
    }
}

#[async_trait]
impl ListingFeed for TwicketsFeed {
    async fn fetch_listings(&self, query: FetchQuery) -> Result<Vec<TicketListing>> {
        let mut url = format!(
            "{}/services/catalogue?api_key={}&count={}&q=countryCode={}&maxTime={}",
            self.base_url, self.api_key, query.max_count, self.country, query.created_before,
        );
        if let Some(after) = query.created_after {
            url.push_str(&format!("&minTime={after}"));
        }

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Feed(format!("feed returned HTTP {status}")));
        }

        let body = response.text().await?;
        let listings = parse_feed_response(&body)?;
        debug!(fetched = listings.len(), "fetched listings from feed");
        Ok(listings)
    }
}

#[derive(Deserialize)]
struct FeedResponse {
    #[serde(rename = "responseData", default)]
    response_data: Vec<FeedEntry>,
}

#[derive(Deserialize)]
struct FeedEntry {
    /// Null when the block has been delisted.
    #[serde(rename = "catalogBlockSummary")]
    listing: Option<TicketListing>,
}

/// Parse the catalogue response, dropping delisted (null) entries. Order
/// is preserved: the feed returns newest listings first.
pub fn parse_feed_response(body: &str) -> Result<Vec<TicketListing>> {
    let response: FeedResponse = serde_json::from_str(body)?;
    Ok(response.response_data.into_iter().filter_map(|entry| entry.listing).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP stub: serves a single canned response and hands back
    /// the raw request it received.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len(),
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        (base_url, server)
    }

    const FEED_BODY: &str = r#"{
        "responseData": [
            {
                "catalogBlockSummary": {
                    "blockId": "b2",
                    "created": 1700000002000,
                    "ticketQuantity": 2,
                    "totalSellingPrice": {"amountInCents": 9000, "currencyCode": "GBP"},
                    "totalTwicketsFee": {"amountInCents": 1000, "currencyCode": "GBP"},
                    "faceValuePrice": {"amountInCents": 12000, "currencyCode": "GBP"},
                    "priceTier": "Standing",
                    "sellerWillConsiderOffers": true,
                    "event": {
                        "eventName": "Event A",
                        "date": "Saturday 14 March 2026",
                        "showStartingTime": "7:30pm",
                        "venue": {
                            "name": "The O2",
                            "location": {"shortName": "London", "regionCode": "GBLO"}
                        }
                    }
                }
            },
            {"catalogBlockSummary": null},
            {
                "catalogBlockSummary": {
                    "blockId": "b1",
                    "created": 1700000001000,
                    "ticketQuantity": 1,
                    "totalSellingPrice": {"amountInCents": 4000}
                }
            }
        ]
    }"#;

    #[test]
    fn parses_listings_and_skips_delisted() {
        let listings = parse_feed_response(FEED_BODY).unwrap();
        assert_eq!(listings.len(), 2);

        let first = &listings[0];
        assert_eq!(first.id, "b2");
        assert_eq!(first.created_at, 1_700_000_002_000);
        assert_eq!(first.quantity, 2);
        assert_eq!(first.event.name, "Event A");
        assert_eq!(first.event.venue.location.region, "GBLO");
        assert_eq!(first.total_price_incl_fee().pennies, 10000);
        assert!(first.seller_will_consider_offers);

        // Sparse entry falls back to defaults
        let second = &listings[1];
        assert_eq!(second.id, "b1");
        assert_eq!(second.fee.pennies, 0);
        assert_eq!(second.event.name, "");
    }

    #[test]
    fn newest_first_order_is_preserved() {
        let listings = parse_feed_response(FEED_BODY).unwrap();
        assert!(listings[0].created_at > listings[1].created_at);
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_feed_response("not json").is_err());
    }

    #[tokio::test]
    async fn fetch_queries_the_catalogue_endpoint_with_the_window() {
        let (base_url, server) = serve_once("200 OK", FEED_BODY).await;
        let feed =
            TwicketsFeed::with_base_url("key123".to_string(), "GB".to_string(), base_url).unwrap();

        let listings = feed
            .fetch_listings(FetchQuery {
                created_after: Some(1_700_000_000_500),
                created_before: 1_700_000_009_000,
                max_count: 10,
            })
            .await
            .unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].id, "b2");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /services/catalogue?"), "{request}");
        assert!(request.contains("api_key=key123"));
        assert!(request.contains("count=10"));
        assert!(request.contains("q=countryCode=GB"));
        assert!(request.contains("maxTime=1700000009000"));
        assert!(request.contains("minTime=1700000000500"));
    }

    #[tokio::test]
    async fn fetch_without_watermark_omits_the_lower_bound() {
        let (base_url, server) = serve_once("200 OK", r#"{"responseData": []}"#).await;
        let feed =
            TwicketsFeed::with_base_url("key123".to_string(), "GB".to_string(), base_url).unwrap();

        let listings = feed
            .fetch_listings(FetchQuery {
                created_after: None,
                created_before: 1_700_000_009_000,
                max_count: 10,
            })
            .await
            .unwrap();
        assert!(listings.is_empty());

        let request = server.await.unwrap();
        assert!(!request.contains("minTime="));
    }

    #[tokio::test]
    async fn non_success_status_is_a_feed_error() {
        let (base_url, server) = serve_once("503 Service Unavailable", "{}").await;
        let feed =
            TwicketsFeed::with_base_url("key123".to_string(), "GB".to_string(), base_url).unwrap();

        let err = feed
            .fetch_listings(FetchQuery {
                created_after: None,
                created_before: 1_700_000_009_000,
                max_count: 10,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Feed(_)), "{err}");
        server.await.unwrap();
    }
}
