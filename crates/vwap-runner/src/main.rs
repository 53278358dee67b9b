//! # vwap-runner
//!
//! Streams trades from the Coinbase `matches` channel and prints a
//! sliding-window VWAP per product to stdout.
//!
//! Settings come from an optional JSON config file; flags override it.
//! SIGINT / SIGTERM stop the pipeline cleanly (exit status 0). Any other
//! pipeline failure exits non-zero.
//!
//! # Usage
//!
//! ```bash
//! vwap-runner --products BTC-USD,ETH-USD --window 200 --log-level info
//! vwap-runner --config vwap.json
//! ```

mod sink;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use vwap_core::config::{AppConfig, FailurePolicy, load_config, parse_products};
use vwap_feed::pipeline::{Pipeline, PipelineConfig};

use crate::sink::StdoutSink;

/// Streaming VWAP calculator for the Coinbase matches feed.
#[derive(Parser)]
#[command(name = "vwap-runner", about = "Streaming VWAP calculator for the Coinbase matches feed")]
struct Cli {
    /// Configuration file path (JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Websocket feed URI.
    #[arg(long)]
    addr: Option<String>,

    /// Comma-separated list of product ids.
    #[arg(long)]
    products: Option<String>,

    /// Number of most recent trades in each VWAP window.
    #[arg(long)]
    window: Option<usize>,

    /// What a failing product does to the others (fail_fast, isolate).
    #[arg(long)]
    failure_policy: Option<FailurePolicy>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply(self, config: &mut AppConfig) {
        if let Some(addr) = self.addr {
            config.feed.url = addr;
        }
        if let Some(products) = self.products {
            config.feed.products = parse_products(&products);
        }
        if let Some(window) = self.window {
            config.feed.window = window;
        }
        if let Some(policy) = self.failure_policy {
            config.feed.failure_policy = policy;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(dir) = self.log_dir {
            config.logging.dir = Some(dir);
        }
        if self.json_logs {
            config.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration and apply overrides
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    // 2. Initialize logging
    vwap_core::logging::init_logging(&config.logging)?;
    info!(
        "vwap-runner starting: url={}, products={:?}, window={}",
        config.feed.url, config.feed.products, config.feed.window
    );

    // 3. Wire shutdown signals to the root token
    let cancel = CancellationToken::new();
    tokio::spawn(watch_signals(cancel.clone()));

    // 4. Run until cancelled or a chain fails
    let pipeline = Pipeline::new(PipelineConfig::from_feed_config(&config.feed), Arc::new(StdoutSink));
    match pipeline.run(cancel).await {
        Ok(()) => {
            info!("pipeline stopped, goodbye");
            Ok(())
        }
        Err(e) => {
            error!("pipeline failed: {e}");
            Err(e.into())
        }
    }
}

async fn watch_signals(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                error!("cannot install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                cancel.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
            _ = term.recv() => info!("SIGTERM received"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received");
    }
    cancel.cancel();
}
