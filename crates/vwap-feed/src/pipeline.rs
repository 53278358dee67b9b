//! Per-product pipeline engine.
//!
//! Each product gets its own chain of three tasks:
//!
//! ```text
//! run_feed ──► events (cap = window) ──► run_aggregator ──► results (cap = window) ──► run_sink
//! ```
//!
//! All chains run in parallel under one root cancellation token; each chain
//! works under a child token. Under [`FailurePolicy::FailFast`] the first real
//! error cancels every chain; under [`FailurePolicy::Isolate`] it only cancels
//! its own chain. [`Pipeline::run`] waits for every task, then reports the
//! first error, or `Ok(())` when the pipeline was simply cancelled.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use vwap_core::config::{FailurePolicy, FeedConfig};
use vwap_core::ws::WsConnConfig;
use vwap_core::VwapError;

use crate::aggregate_worker::{run_aggregator, run_sink};
use crate::feed_worker::{FeedParams, run_feed};
use crate::VwapSink;

/// Everything needed to run the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Feed endpoint.
    pub url: String,
    /// Connection tuning shared by every chain.
    pub connection: WsConnConfig,
    /// One chain per product.
    pub products: Vec<String>,
    /// VWAP window width and queue capacity.
    pub window: usize,
    pub failure_policy: FailurePolicy,
}

impl PipelineConfig {
    pub fn from_feed_config(cfg: &FeedConfig) -> Self {
        Self {
            url: cfg.url.clone(),
            connection: cfg.ws_config(),
            products: cfg.products.clone(),
            window: cfg.window,
            failure_policy: cfg.failure_policy,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Feed,
    Aggregator,
    Sink,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Feed => write!(f, "feed"),
            Self::Aggregator => write!(f, "aggregator"),
            Self::Sink => write!(f, "sink"),
        }
    }
}

struct StageExit {
    product_id: String,
    stage: Stage,
    chain: CancellationToken,
    result: Result<(), VwapError>,
}

/// Runs one feed → VWAP → sink chain per configured product.
pub struct Pipeline {
    config: PipelineConfig,
    sink: Arc<dyn VwapSink>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, sink: Arc<dyn VwapSink>) -> Self {
        Self { config, sink }
    }

    /// Run every chain until `cancel` fires or a chain fails.
    ///
    /// Returns `Ok(())` when stopped through `cancel`, otherwise the first
    /// error any stage reported. Always waits for every task to finish.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), VwapError> {
        let window = self.config.window;
        if window == 0 {
            return Err(VwapError::Config("window width must be at least 1".into()));
        }
        if self.config.products.is_empty() {
            return Err(VwapError::Config("no products configured".into()));
        }

        let root = cancel.child_token();
        let mut tasks: JoinSet<StageExit> = JoinSet::new();

        for product_id in &self.config.products {
            let chain = root.child_token();
            let (events_tx, events_rx) = mpsc::channel(window);
            let (results_tx, results_rx) = mpsc::channel(window);

            let params = FeedParams {
                url: self.config.url.clone(),
                connection: self.config.connection.clone(),
                product_id: product_id.clone(),
                window,
                events: events_tx,
            };
            let exit = stage_exit(product_id, Stage::Feed, &chain);
            let token = chain.clone();
            tasks.spawn(async move { exit(run_feed(params, token).await) });

            let exit = stage_exit(product_id, Stage::Aggregator, &chain);
            let (product, token) = (product_id.clone(), chain.clone());
            tasks.spawn(async move { exit(run_aggregator(&product, window, events_rx, results_tx, token).await) });

            let exit = stage_exit(product_id, Stage::Sink, &chain);
            let (product, token, sink) = (product_id.clone(), chain.clone(), Arc::clone(&self.sink));
            tasks.spawn(async move { exit(run_sink(&product, results_rx, sink, token).await) });
        }

        info!(
            "[pipeline] started {} chains ({} tasks), window {window}, policy {:?}",
            self.config.products.len(),
            tasks.len(),
            self.config.failure_policy
        );

        let mut first_err: Option<VwapError> = None;
        while let Some(joined) = tasks.join_next().await {
            let exit = match joined {
                Ok(exit) => exit,
                Err(e) => {
                    // The owning chain is unknown, so every chain goes down.
                    error!("[pipeline] task failed: {e}");
                    first_err.get_or_insert(VwapError::Task(e.to_string()));
                    root.cancel();
                    continue;
                }
            };

            let StageExit { product_id, stage, chain, result } = exit;
            match result {
                Ok(()) => debug!("[pipeline] {product_id} {stage} finished"),
                Err(e) if e.is_cancelled() => debug!("[pipeline] {product_id} {stage} cancelled"),
                Err(e) => {
                    error!("[pipeline] {product_id} {stage} failed: {e}");
                    first_err.get_or_insert(e);
                    match self.config.failure_policy {
                        FailurePolicy::FailFast => root.cancel(),
                        FailurePolicy::Isolate => chain.cancel(),
                    }
                }
            }
        }

        info!("[pipeline] all chains stopped");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn stage_exit(
    product_id: &str,
    stage: Stage,
    chain: &CancellationToken,
) -> impl FnOnce(Result<(), VwapError>) -> StageExit + Send + 'static {
    let product_id = product_id.to_string();
    let chain = chain.clone();
    move |result| StageExit { product_id, stage, chain, result }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NullSink;

    #[async_trait]
    impl VwapSink for NullSink {
        async fn emit(&self, _: &str, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn config(products: &[&str], window: usize) -> PipelineConfig {
        PipelineConfig {
            url: "ws://127.0.0.1:1".into(),
            connection: WsConnConfig::default(),
            products: products.iter().map(|p| p.to_string()).collect(),
            window,
            failure_policy: FailurePolicy::FailFast,
        }
    }

    #[tokio::test]
    async fn rejects_empty_setup() {
        let p = Pipeline::new(config(&[], 10), Arc::new(NullSink));
        assert!(matches!(p.run(CancellationToken::new()).await, Err(VwapError::Config(_))));
        let p = Pipeline::new(config(&["BTC-USD"], 0), Arc::new(NullSink));
        assert!(matches!(p.run(CancellationToken::new()).await, Err(VwapError::Config(_))));
    }

    #[tokio::test]
    async fn connection_failure_is_returned() {
        let p = Pipeline::new(config(&["BTC-USD", "ETH-USD"], 4), Arc::new(NullSink));
        let result = p.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(VwapError::Connection { .. })), "{result:?}");
    }

    #[tokio::test]
    async fn cancelled_before_start_is_ok() {
        let p = Pipeline::new(config(&["BTC-USD"], 4), Arc::new(NullSink));
        let cancel = CancellationToken::new();
        cancel.cancel();
        // Every stage observes the cancelled token; a racing connect attempt
        // may still fail, which is also a valid outcome here.
        let result = p.run(cancel).await;
        assert!(matches!(result, Ok(()) | Err(VwapError::Connection { .. })), "{result:?}");
    }

    #[test]
    fn from_feed_config_copies_settings() {
        let feed = FeedConfig { window: 7, failure_policy: FailurePolicy::Isolate, ..FeedConfig::default() };
        let cfg = PipelineConfig::from_feed_config(&feed);
        assert_eq!(cfg.window, 7);
        assert_eq!(cfg.products, feed.products);
        assert_eq!(cfg.failure_policy, FailurePolicy::Isolate);
        assert_eq!(cfg.connection.pong_wait, feed.ws_config().pong_wait);
    }
}
