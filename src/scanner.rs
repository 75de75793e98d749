use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{COLD_START_FETCH_COUNT, MAX_FETCH_COUNT};
use crate::error::{AppError, Result};
use crate::feed::{FetchQuery, ListingFeed};
use crate::filter::{evaluate, ListingFilter, Rejection};
use crate::notify::{dispatch, ClientMap};

/// The scanner's live configuration: the feed client, resolved filters
/// and the channel registry. Replaced atomically as a whole by
/// `update_config`, so a credential change swaps the feed client along
/// with everything else.
pub struct ScanConfig {
    pub feed: Arc<dyn ListingFeed>,
    pub filters: Vec<ListingFilter>,
    pub clients: ClientMap,
}

struct Shared {
    scan: ScanConfig,
    /// Creation time (unix millis) of the newest listing seen. Listings
    /// at or below it are never processed again. Never moves backward.
    watermark: Option<u64>,
}

/// Polls the live feed on a fixed interval and routes matched listings to
/// notification channels.
///
/// Lifecycle: Idle → Running → Stopping → Idle, restartable. `start`
/// claims the running bit with a compare-and-swap and blocks for the
/// whole run; `stop` is idempotent and safe to call from any number of
/// tasks concurrently. The feed client, filters, channel registry and
/// watermark all live behind one mutex which a scan cycle holds for its
/// entire fetch-filter-dispatch sequence, so `update_config` can never be
/// observed partially: a cycle sees wholly the old or wholly the new
/// configuration.
pub struct TicketScanner {
    refetch_interval: Duration,
    shared: Mutex<Shared>,

    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    stopped_tx: watch::Sender<bool>,
    /// Serializes the start/stop signal transitions: without it a stop
    /// landing between start's claim and its signal reset would be lost.
    lifecycle: std::sync::Mutex<()>,
}

impl TicketScanner {
    pub fn new(refetch_interval: Duration, scan: ScanConfig) -> Self {
        Self {
            refetch_interval,
            shared: Mutex::new(Shared { scan, watermark: None }),
            running: AtomicBool::new(false),
            shutdown_tx: watch::Sender::new(false),
            stopped_tx: watch::Sender::new(true),
            lifecycle: std::sync::Mutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the scan loop. Blocks the calling task until `stop` is called;
    /// callers wanting it in the background spawn it themselves. The
    /// first cycle runs immediately, then one per refetch interval.
    ///
    /// Errors with `AlreadyRunning` if a run is already active, leaving
    /// the existing run undisturbed.
    pub async fn start(&self) -> Result<()> {
        let shutdown_rx = {
            let _lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
            if self
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return Err(AppError::AlreadyRunning);
            }
            self.shutdown_tx.send_replace(false);
            self.stopped_tx.send_replace(false);
            // Subscribed under the same lock stop() signals under, so a
            // stop can never slip between the reset and the subscription.
            self.shutdown_tx.subscribe()
        };

        // Resets the running bit and releases stop() waiters even if the
        // start future is dropped mid-run.
        let _guard = RunGuard { scanner: self };

        info!(refetch_secs = self.refetch_interval.as_secs(), "scanner started");
        self.run_loop(shutdown_rx).await;
        info!("scanner stopped");
        Ok(())
    }

    async fn run_loop(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval(self.refetch_interval);
        // A slow cycle must not cause a burst of catch-up cycles.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // First tick fires immediately: the initial scan runs
                // without waiting out the interval.
                _ = ticker.tick() => self.scan_cycle().await,
                // Level-triggered: fires even if the signal was raised
                // before this loop first polled it.
                // The guard returned by `wait_for` is dropped inside the
                // async block so the select output stays `Send`.
                _ = async { let _ = shutdown_rx.wait_for(|stop| *stop).await; } => return,
            }
        }
    }

    /// Signal shutdown and wait until the loop has fully exited,
    /// including any in-flight cycle. Idempotent: concurrent callers all
    /// wait for the same shutdown, and stopping an idle scanner returns
    /// immediately.
    pub async fn stop(&self) {
        let mut stopped_rx = {
            let _lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            self.shutdown_tx.send_replace(true);
            self.stopped_tx.subscribe()
        };
        let _ = stopped_rx.wait_for(|stopped| *stopped).await;
    }

    /// Replace the active feed client, filters and channel registry. Safe
    /// to call at any time; if a cycle is in flight this waits for it to
    /// finish, so the new configuration takes effect on the next cycle as
    /// a whole. The watermark is preserved across updates.
    pub async fn update_config(&self, scan: ScanConfig) {
        let mut shared = self.shared.lock().await;
        shared.scan = scan;
        info!(filters = shared.scan.filters.len(), "scanner config updated");
    }

    async fn scan_cycle(&self) {
        let mut shared = self.shared.lock().await;

        // With no watermark yet, anything the feed returns is old news;
        // fetch a small page rather than flooding notifications.
        let max_count = if shared.watermark.is_none() {
            COLD_START_FETCH_COUNT
        } else {
            MAX_FETCH_COUNT
        };
        let query = FetchQuery {
            created_after: shared.watermark,
            created_before: now_millis(),
            max_count,
        };

        let feed = Arc::clone(&shared.scan.feed);
        let listings = match feed.fetch_listings(query).await {
            Ok(listings) => listings,
            Err(e) => {
                // Transient: skip this cycle, the next tick retries with
                // the watermark unchanged.
                error!("failed to fetch listings, skipping cycle: {e}");
                return;
            }
        };

        debug!(fetched = listings.len(), "scan cycle fetched listings");
        if listings.is_empty() {
            return;
        }
        if listings.len() >= max_count {
            warn!(
                "fetched the maximum number of listings allowed per cycle; \
                 it is possible listings have been missed"
            );
        }

        let previous_watermark = shared.watermark;

        // The feed returns the most recent listing first.
        let newest = listings[0].created_at;
        if previous_watermark.is_none_or(|w| newest > w) {
            shared.watermark = Some(newest);
        }

        for listing in &listings {
            // Never reprocess anything at or below the previous watermark,
            // whatever the feed returned.
            if previous_watermark.is_some_and(|w| listing.created_at <= w) {
                debug!(listing = %listing.id, "skipping already-processed listing");
                continue;
            }

            for filter in &shared.scan.filters {
                match evaluate(listing, filter) {
                    Ok(()) => {
                        info!(
                            wanted_event = %filter.event,
                            listing_event = %listing.event.name,
                            quantity = listing.quantity,
                            ticket_price = %listing.ticket_price_incl_fee(),
                            original_price = %listing.original_ticket_price(),
                            link = %listing.url(),
                            "found tickets for a wanted event",
                        );
                        dispatch(listing, filter, &shared.scan.clients).await;
                    }
                    // Nearly every listing on the feed fails the name
                    // check; logging those would be pure noise.
                    Err(Rejection::Name { .. }) => {}
                    Err(rejection) => {
                        warn!(
                            wanted_event = %filter.event,
                            listing_event = %listing.event.name,
                            "found tickets for a wanted event, but {rejection}",
                        );
                    }
                }
            }
        }
    }
}

struct RunGuard<'a> {
    scanner: &'a TicketScanner,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.scanner.running.store(false, Ordering::SeqCst);
        self.scanner.stopped_tx.send_replace(true);
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
