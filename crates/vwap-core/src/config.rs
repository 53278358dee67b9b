//! Configuration parsing for the VWAP engine.
//!
//! Settings come from an optional JSON file; every field has a default so an
//! empty object (or no file at all) yields a working setup against the public
//! Coinbase feed. Command-line flags in the runner override file values.
//!
//! # Example config
//!
//! ```json
//! {
//!   "feed": {
//!     "url": "wss://ws-feed.exchange.coinbase.com",
//!     "products": ["BTC-USD", "ETH-USD", "ETH-BTC"],
//!     "window": 200,
//!     "pong_wait_ms": 5000,
//!     "failure_policy": "fail_fast"
//!   },
//!   "logging": { "level": "info", "dir": "/tmp/log", "json": false }
//! }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::VwapError;
use crate::ws::WsConnConfig;

pub const DEFAULT_FEED_URL: &str = "wss://ws-feed.exchange.coinbase.com";
pub const DEFAULT_PRODUCTS: &str = "BTC-USD,ETH-USD,ETH-BTC";
pub const DEFAULT_WINDOW: usize = 200;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), VwapError> {
        self.feed.validate()
    }
}

/// What happens to the other chains when one product's chain fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Cancel every chain on the first failure.
    #[default]
    FailFast,
    /// Let the remaining chains keep running.
    Isolate,
}

impl std::str::FromStr for FailurePolicy {
    type Err = VwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail_fast" | "fail-fast" => Ok(Self::FailFast),
            "isolate" => Ok(Self::Isolate),
            other => Err(VwapError::Config(format!("unknown failure policy {other:?}"))),
        }
    }
}

/// Feed endpoint, instruments and connection tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Websocket endpoint (`ws://` or `wss://`).
    pub url: String,

    /// Instruments to aggregate, one pipeline chain each.
    pub products: Vec<String>,

    /// Number of most recent trades in each VWAP window. Also the capacity of
    /// each chain's queues.
    pub window: usize,

    /// Read deadline, pushed forward on every pong.
    pub pong_wait_ms: u64,

    /// Deadline for any single frame write.
    pub write_wait_ms: u64,

    /// How long `stop()` waits for the peer to acknowledge a close frame.
    pub close_wait_ms: u64,

    /// Ping interval. Defaults to 9/10 of `pong_wait_ms`.
    pub ping_period_ms: Option<u64>,

    /// Inbound message and frame size ceiling in bytes.
    pub max_message_size: usize,

    /// Extra HTTP headers for the websocket handshake.
    pub extra_headers: HashMap<String, String>,

    pub failure_policy: FailurePolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        let ws = WsConnConfig::default();
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            products: parse_products(DEFAULT_PRODUCTS),
            window: DEFAULT_WINDOW,
            pong_wait_ms: ws.pong_wait.as_millis() as u64,
            write_wait_ms: ws.write_wait.as_millis() as u64,
            close_wait_ms: ws.close_wait.as_millis() as u64,
            ping_period_ms: None,
            max_message_size: ws.max_message_size,
            extra_headers: HashMap::new(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl FeedConfig {
    /// Connection settings for [`crate::ws::connect`].
    pub fn ws_config(&self) -> WsConnConfig {
        WsConnConfig {
            extra_headers: self.extra_headers.clone(),
            max_message_size: self.max_message_size,
            pong_wait: Duration::from_millis(self.pong_wait_ms),
            write_wait: Duration::from_millis(self.write_wait_ms),
            close_wait: Duration::from_millis(self.close_wait_ms),
            ping_period: self.ping_period_ms.map(Duration::from_millis),
        }
    }

    pub fn validate(&self) -> Result<(), VwapError> {
        if self.url.is_empty() {
            return Err(VwapError::Config("feed url is empty".into()));
        }
        if self.window == 0 {
            return Err(VwapError::Config("window width must be at least 1".into()));
        }
        if self.products.is_empty() {
            return Err(VwapError::Config("no products configured".into()));
        }
        if self.products.iter().any(|p| p.is_empty()) {
            return Err(VwapError::Config(format!("empty product id in {:?}", self.products)));
        }
        if self.pong_wait_ms == 0 {
            return Err(VwapError::Config("pong_wait_ms must be positive".into()));
        }
        if self.max_message_size == 0 {
            return Err(VwapError::Config("max_message_size must be positive".into()));
        }
        let ping = self.ws_config().ping_period();
        if ping.is_zero() || ping >= Duration::from_millis(self.pong_wait_ms) {
            return Err(VwapError::Config(format!(
                "ping period {ping:?} must be positive and shorter than pong wait {}ms",
                self.pong_wait_ms
            )));
        }
        Ok(())
    }
}

/// Logging settings consumed by [`crate::logging::init_logging`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for daily-rotating log files. Console only when unset.
    pub dir: Option<String>,
    /// Log file prefix.
    pub file_prefix: String,
    /// Emit JSON lines on the console instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            file_prefix: "vwap".to_string(),
            json: false,
        }
    }
}

/// Split a comma-separated instrument list, trimming whitespace around each id.
pub fn parse_products(csv: &str) -> Vec<String> {
    csv.split(',').map(|p| p.trim().to_string()).collect()
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}
