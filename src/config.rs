use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tokio::time::interval;
use tracing::{error, info};

use crate::error::{AppError, Result};
use crate::types::Channel;

/// Hard cap on listings fetched per cycle. Hitting it means the feed may
/// hold more new listings than fit in one page.
pub const MAX_FETCH_COUNT: usize = 250;

/// First cycle after startup has no watermark; fetch only a handful to
/// avoid flooding notifications with stale listings.
pub const COLD_START_FETCH_COUNT: usize = 10;

/// Below this magnitude a configured discount or price is treated as
/// "no constraint" rather than a literal zero. Distinguishes an unset
/// numeric field (which decodes as 0) from a meaningful bound.
pub const UNCONSTRAINED_EPSILON: f64 = 1e-5;

pub const DEFAULT_REFETCH_SECS: u64 = 60;

/// How often the reload watcher polls the config file for changes.
pub const CONFIG_POLL_SECS: u64 = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_key: String,
    pub country: String,
    #[serde(default = "default_refetch_secs")]
    pub refetch_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub global: GlobalFilterConfig,
    #[serde(default)]
    pub tickets: Vec<TicketConfig>,
}

fn default_refetch_secs() -> u64 {
    DEFAULT_REFETCH_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Matching defaults applied to every interest that does not override
/// them. Zero values mean "no constraint".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalFilterConfig {
    /// Name similarity threshold, 0-100. 0 accepts any name.
    #[serde(default)]
    pub event_similarity: f64,
    /// Allowed venue region codes. Empty allows any region.
    #[serde(default)]
    pub regions: Vec<String>,
    /// Exact number of tickets wanted. 0 allows any quantity.
    #[serde(default)]
    pub num_tickets: u32,
    /// Minimum discount against face value, percent. 0 allows any.
    #[serde(default)]
    pub min_discount: f64,
    /// Maximum per-ticket price including fee, major units. 0 allows any.
    #[serde(default)]
    pub max_ticket_price: f64,
    /// Channels to notify. Empty falls back to all configured channels.
    #[serde(default)]
    pub notification: Vec<Channel>,
}

/// One wanted event. Every field except the event name is optional: an
/// absent field inherits the global default, while an explicit zero is
/// honored as "no constraint" even when the global default constrains.
#[derive(Debug, Clone, Deserialize)]
pub struct TicketConfig {
    pub event: String,
    #[serde(default)]
    pub event_similarity: Option<f64>,
    #[serde(default)]
    pub regions: Option<Vec<String>>,
    #[serde(default)]
    pub num_tickets: Option<u32>,
    #[serde(default)]
    pub min_discount: Option<f64>,
    #[serde(default)]
    pub max_ticket_price: Option<f64>,
    #[serde(default)]
    pub notification: Option<Vec<Channel>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub ntfy: Option<NtfySettings>,
    #[serde(default)]
    pub gotify: Option<GotifySettings>,
    #[serde(default)]
    pub telegram: Option<TelegramSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NtfySettings {
    pub url: String,
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GotifySettings {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSettings {
    pub token: String,
    pub chat_id: i64,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn refetch_interval(&self) -> Duration {
        Duration::from_secs(self.refetch_secs.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(AppError::Config("api_key must be set".to_string()));
        }
        if self.country.is_empty() {
            return Err(AppError::Config("country must be set".to_string()));
        }

        validate_similarity(self.global.event_similarity)?;
        for ticket in &self.tickets {
            if ticket.event.is_empty() {
                return Err(AppError::Config("ticket event name must be set".to_string()));
            }
            if let Some(similarity) = ticket.event_similarity {
                validate_similarity(similarity)?;
            }
        }

        self.notifications.validate()
    }
}

fn validate_similarity(value: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(AppError::Config(format!(
            "event_similarity must be between 0 and 100, got {value}"
        )));
    }
    Ok(())
}

impl NotificationSettings {
    pub fn validate(&self) -> Result<()> {
        if let Some(ntfy) = &self.ntfy {
            if !begins_with_http(&ntfy.url) {
                return Err(AppError::Config(
                    "ntfy url must begin with 'http://' or 'https://'".to_string(),
                ));
            }
            if ntfy.topic.is_empty() {
                return Err(AppError::Config("ntfy topic must be set".to_string()));
            }
        }

        if let Some(gotify) = &self.gotify {
            if !begins_with_http(&gotify.url) {
                return Err(AppError::Config(
                    "gotify url must begin with 'http://' or 'https://'".to_string(),
                ));
            }
            if gotify.token.is_empty() {
                return Err(AppError::Config("gotify token must be set".to_string()));
            }
        }

        if let Some(telegram) = &self.telegram {
            if telegram.token.is_empty() {
                return Err(AppError::Config("telegram token must be set".to_string()));
            }
            if telegram.chat_id == 0 {
                return Err(AppError::Config("telegram chat id must be set".to_string()));
            }
        }

        Ok(())
    }
}

fn begins_with_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Watch a config file and invoke the callback with each successfully
/// reloaded config. Polls the file's mtime; a reload that fails to parse
/// or validate is logged and the previous config stays active. Runs until
/// the task is dropped.
pub async fn watch_config<F>(path: std::path::PathBuf, mut on_reload: F)
where
    F: FnMut(Config),
{
    let mut last_modified = file_mtime(&path);
    let mut ticker = interval(Duration::from_secs(CONFIG_POLL_SECS));
    ticker.tick().await; // the caller already loaded the initial config

    loop {
        ticker.tick().await;

        let modified = match file_mtime(&path) {
            Some(m) => m,
            None => continue,
        };
        if last_modified == Some(modified) {
            continue;
        }
        last_modified = Some(modified);

        info!("config file changed, reloading");
        match Config::load(&path) {
            Ok(config) => on_reload(config),
            Err(e) => error!("failed to reload config, keeping previous: {e}"),
        }
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
