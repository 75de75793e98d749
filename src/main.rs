mod config;
mod error;
mod feed;
mod filter;
mod notify;
mod scanner;
mod similarity;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Result;
use crate::feed::{ListingFeed, TwicketsFeed};
use crate::filter::ListingFilter;
use crate::scanner::{ScanConfig, TicketScanner};

#[tokio::main]
async fn main() {
    let config_path: PathBuf =
        std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string()).into();

    let cfg = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(config_path, cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(config_path: PathBuf, cfg: Config) -> Result<()> {
    let feed: Arc<dyn ListingFeed> =
        Arc::new(TwicketsFeed::new(cfg.api_key.clone(), cfg.country.clone())?);

    let clients = notify::build_clients(&cfg.notifications)?;
    if clients.is_empty() {
        warn!("no notification providers configured; matches will only be logged");
    }

    let filters = filter::resolve(&cfg.global, &cfg.tickets);
    log_monitored_events(&filters);

    let scanner = Arc::new(TicketScanner::new(
        cfg.refetch_interval(),
        ScanConfig { feed, filters, clients },
    ));

    // Config reload: the file watcher feeds reloaded configs through a
    // channel; this task re-resolves and swaps them into the scanner.
    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel::<Config>();
    tokio::spawn(config::watch_config(config_path, move |new_cfg| {
        let _ = reload_tx.send(new_cfg);
    }));

    let reload_scanner = Arc::clone(&scanner);
    tokio::spawn(async move {
        while let Some(new_cfg) = reload_rx.recv().await {
            // The feed client is rebuilt too, so API key or country
            // changes take effect without a restart.
            let feed: Arc<dyn ListingFeed> =
                match TwicketsFeed::new(new_cfg.api_key.clone(), new_cfg.country.clone()) {
                    Ok(feed) => Arc::new(feed),
                    Err(e) => {
                        error!("failed to rebuild feed client, keeping previous config: {e}");
                        continue;
                    }
                };
            match notify::build_clients(&new_cfg.notifications) {
                Ok(clients) => {
                    let filters = filter::resolve(&new_cfg.global, &new_cfg.tickets);
                    log_monitored_events(&filters);
                    reload_scanner.update_config(ScanConfig { feed, filters, clients }).await;
                }
                Err(e) => {
                    error!("failed to rebuild notification clients, keeping previous config: {e}");
                }
            }
        }
    });

    let run_scanner = Arc::clone(&scanner);
    let scan_task = tokio::spawn(async move { run_scanner.start().await });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping scanner");
    scanner.stop().await;

    match scan_task.await {
        Ok(result) => result,
        Err(e) => {
            error!("scanner task failed: {e}");
            Ok(())
        }
    }
}

fn log_monitored_events(filters: &[ListingFilter]) {
    let events: Vec<&str> = filters.iter().map(|f| f.event.as_str()).collect();
    info!("Monitoring: {}", events.join(", "));
}
