mod gotify;
mod ntfy;
mod telegram;

pub use gotify::GotifyClient;
pub use ntfy::NtfyClient;
pub use telegram::TelegramClient;

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{debug, error};

use crate::config::NotificationSettings;
use crate::error::Result;
use crate::filter::ListingFilter;
use crate::types::{Channel, TicketListing};

/// One hung or slow provider must not stall a scan cycle indefinitely.
pub const DISPATCH_TIMEOUT_SECS: u64 = 30;

/// A notification delivery capability. One attempt per call; no retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_listing(&self, listing: &TicketListing) -> Result<()>;
}

pub type ClientMap = HashMap<Channel, Arc<dyn Notifier>>;

/// Build one client per provider section present in the config.
pub fn build_clients(settings: &NotificationSettings) -> Result<ClientMap> {
    let mut clients: ClientMap = HashMap::new();

    if let Some(ntfy) = &settings.ntfy {
        clients.insert(Channel::Ntfy, Arc::new(NtfyClient::new(ntfy.clone())?));
    }
    if let Some(gotify) = &settings.gotify {
        clients.insert(Channel::Gotify, Arc::new(GotifyClient::new(gotify.clone())?));
    }
    if let Some(telegram) = &settings.telegram {
        clients.insert(Channel::Telegram, Arc::new(TelegramClient::new(telegram.clone())?));
    }

    Ok(clients)
}

/// Deliver a matched listing to every channel the filter resolved to.
///
/// Channels with no configured provider are skipped silently — enabling a
/// channel in an interest without configuring the provider is not an
/// error. Sends run in parallel; a failing or timed-out channel is logged
/// and never affects its siblings. Strictly best-effort: at most one
/// attempt per (listing, channel) pair.
pub async fn dispatch(listing: &TicketListing, filter: &ListingFilter, clients: &ClientMap) {
    let sends = filter
        .channels
        .iter()
        .filter_map(|channel| clients.get(channel).map(|client| (*channel, client)))
        .map(|(channel, client)| async move {
            let send = client.send_listing(listing);
            match tokio::time::timeout(Duration::from_secs(DISPATCH_TIMEOUT_SECS), send).await {
                Ok(Ok(())) => {
                    debug!(channel = %channel, listing = %listing.id, "sent notification");
                }
                Ok(Err(e)) => {
                    error!(channel = %channel, listing = %listing.id, "failed to send notification: {e}");
                }
                Err(_) => {
                    error!(
                        channel = %channel,
                        listing = %listing.id,
                        "notification send timed out after {DISPATCH_TIMEOUT_SECS}s",
                    );
                }
            }
        });

    join_all(sends).await;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Include the event name as a leading header.
    pub header: bool,
    /// Include the buy link as a trailing footer.
    pub footer: bool,
}

/// Render the notification message body for a listing as markdown.
pub fn render_message(listing: &TicketListing, options: RenderOptions) -> String {
    let mut message = String::new();

    if options.header {
        let _ = writeln!(message, "**{}**\n", listing.event.name);
    }

    if !listing.event.date.is_empty() {
        let _ = writeln!(message, "Date: {}", listing.event.date);
    }
    if !listing.event.time.is_empty() {
        let _ = writeln!(message, "Time: {}", listing.event.time);
    }
    let _ = writeln!(message, "Venue: {}", listing.event.venue.name);
    let _ = writeln!(message, "Location: {}", listing.event.venue.location.name);
    if !listing.ticket_type.is_empty() {
        let _ = writeln!(message, "Ticket Type: {}", listing.ticket_type);
    }
    let _ = writeln!(message, "Number of Tickets: {}", listing.quantity);
    let _ = writeln!(
        message,
        "Ticket Price: {} (face value {})",
        listing.ticket_price_incl_fee(),
        listing.original_ticket_price(),
    );
    let _ = writeln!(
        message,
        "Total Price: {} (face value {})",
        listing.total_price_incl_fee(),
        listing.face_value,
    );
    let _ = writeln!(message, "Discount: {}", listing.discount_string());
    if listing.seller_will_consider_offers {
        let _ = writeln!(message, "Seller will consider offers");
    }

    if options.footer {
        let _ = write!(message, "\n[Buy tickets]({})", listing.url());
    }

    message.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{QuantityRule, Threshold};
    use crate::types::{Event, Location, Price, Venue};

    use tokio::sync::Mutex;

    fn listing() -> TicketListing {
        TicketListing {
            id: "block1".to_string(),
            created_at: 1_700_000_000_000,
            quantity: 2,
            selling_price: Price::new(9000),
            fee: Price::new(1000),
            face_value: Price::new(12000),
            ticket_type: "Standing".to_string(),
            seller_will_consider_offers: true,
            event: Event {
                name: "Event A".to_string(),
                date: "Saturday 14 March 2026".to_string(),
                time: "7:30pm".to_string(),
                venue: Venue {
                    name: "The O2".to_string(),
                    location: Location { name: "London".to_string(), region: "GBLO".to_string() },
                },
            },
        }
    }

    fn filter_for(channels: Vec<Channel>) -> ListingFilter {
        ListingFilter {
            event: "Event A".to_string(),
            similarity: 0.75,
            regions: vec![],
            quantity: QuantityRule::Any,
            min_discount: Threshold::Any,
            max_ticket_price: Threshold::Any,
            channels,
        }
    }

    struct FakeNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    impl FakeNotifier {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self { sent: Mutex::new(Vec::new()), fail })
        }
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn send_listing(&self, listing: &TicketListing) -> Result<()> {
            if self.fail {
                return Err(crate::error::AppError::Notify("provider down".to_string()));
            }
            self.sent.lock().await.push(listing.id.clone());
            Ok(())
        }
    }

    #[test]
    fn render_includes_listing_details() {
        let message =
            render_message(&listing(), RenderOptions { header: true, footer: true });
        assert!(message.starts_with("**Event A**"));
        assert!(message.contains("Venue: The O2"));
        assert!(message.contains("Number of Tickets: 2"));
        assert!(message.contains("Ticket Price: £50.00 (face value £60.00)"));
        assert!(message.contains("Total Price: £100.00 (face value £120.00)"));
        assert!(message.contains("Discount: 16.67%"));
        assert!(message.contains("Seller will consider offers"));
        assert!(message.ends_with("[Buy tickets](https://www.twickets.live/app/block/block1,2)"));
    }

    #[test]
    fn render_without_header_or_footer() {
        let message = render_message(&listing(), RenderOptions::default());
        assert!(!message.contains("**Event A**"));
        assert!(!message.contains("Buy tickets"));
        assert!(message.starts_with("Date:"));
    }

    #[tokio::test]
    async fn dispatch_sends_to_each_resolved_channel() {
        let ntfy = FakeNotifier::new(false);
        let telegram = FakeNotifier::new(false);
        let mut clients: ClientMap = HashMap::new();
        clients.insert(Channel::Ntfy, ntfy.clone());
        clients.insert(Channel::Telegram, telegram.clone());

        let filter = filter_for(vec![Channel::Ntfy, Channel::Telegram]);
        dispatch(&listing(), &filter, &clients).await;

        assert_eq!(*ntfy.sent.lock().await, vec!["block1".to_string()]);
        assert_eq!(*telegram.sent.lock().await, vec!["block1".to_string()]);
    }

    #[tokio::test]
    async fn unconfigured_channel_is_skipped_silently() {
        let ntfy = FakeNotifier::new(false);
        let mut clients: ClientMap = HashMap::new();
        clients.insert(Channel::Ntfy, ntfy.clone());

        // Gotify is enabled in the filter but has no client.
        let filter = filter_for(vec![Channel::Gotify, Channel::Ntfy]);
        dispatch(&listing(), &filter, &clients).await;

        assert_eq!(ntfy.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_siblings() {
        let broken = FakeNotifier::new(true);
        let working = FakeNotifier::new(false);
        let mut clients: ClientMap = HashMap::new();
        clients.insert(Channel::Ntfy, broken);
        clients.insert(Channel::Telegram, working.clone());

        let filter = filter_for(vec![Channel::Ntfy, Channel::Telegram]);
        dispatch(&listing(), &filter, &clients).await;

        assert_eq!(working.sent.lock().await.len(), 1);
    }

    #[test]
    fn build_clients_only_registers_configured_providers() {
        let settings = NotificationSettings {
            ntfy: Some(crate::config::NtfySettings {
                url: "https://ntfy.sh".to_string(),
                topic: "tickets".to_string(),
                username: None,
                password: None,
            }),
            gotify: None,
            telegram: None,
        };
        let clients = build_clients(&settings).unwrap();
        assert!(clients.contains_key(&Channel::Ntfy));
        assert!(!clients.contains_key(&Channel::Gotify));
        assert!(!clients.contains_key(&Channel::Telegram));
    }
}
