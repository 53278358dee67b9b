mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{FakeFeedServer, Step, error_reply, sample_trades, subscriptions_ack};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vwap_core::config::FailurePolicy;
use vwap_core::ws::WsConnConfig;
use vwap_core::VwapError;
use vwap_feed::VwapSink;
use vwap_feed::pipeline::{Pipeline, PipelineConfig};

struct ChannelSink(mpsc::UnboundedSender<(String, String)>);

#[async_trait]
impl VwapSink for ChannelSink {
    async fn emit(&self, product_id: &str, vwap: &str) -> anyhow::Result<()> {
        self.0.send((product_id.to_string(), vwap.to_string()))?;
        Ok(())
    }
}

fn pipeline_config(url: &str, products: &[&str], policy: FailurePolicy) -> PipelineConfig {
    PipelineConfig {
        url: url.to_string(),
        connection: WsConnConfig::default(),
        products: products.iter().map(|p| p.to_string()).collect(),
        window: 2,
        failure_policy: policy,
    }
}

/// Valid products get an ack and the six sample trades; `BTC-XXX` is rejected.
async fn scripted_server() -> FakeFeedServer {
    FakeFeedServer::start(|product| {
        if product == "BTC-XXX" {
            return vec![Step::Send(error_reply("BTC-XXX is not a valid product"))];
        }
        let mut steps = vec![Step::Send(subscriptions_ack(product))];
        steps.extend(sample_trades(product));
        steps
    })
    .await
}

async fn collect(rx: &mut mpsc::UnboundedReceiver<(String, String)>, n: usize) -> HashMap<String, Vec<f64>> {
    let mut by_product: HashMap<String, Vec<f64>> = HashMap::new();
    for _ in 0..n {
        let (product, vwap) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(vwap.split('.').nth(1).map(str::len), Some(16), "{vwap}");
        by_product.entry(product).or_default().push(vwap.parse().unwrap());
    }
    by_product
}

const EXPECTED: [f64; 6] = [1.0, 1.6, 2.625, 3.5833333333333335, 4.611111111111111, 5.541666666666667];

#[tokio::test]
async fn every_product_gets_its_own_vwap_stream() {
    let server = scripted_server().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pipeline = Pipeline::new(
        pipeline_config(&server.url, &["BTC-USD", "ETH-USD"], FailurePolicy::FailFast),
        Arc::new(ChannelSink(tx)),
    );

    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { pipeline.run(cancel).await }
    });

    let got = collect(&mut rx, 12).await;
    assert_eq!(got["BTC-USD"], EXPECTED);
    assert_eq!(got["ETH-USD"], EXPECTED);

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(result.is_ok(), "{result:?}");
    assert!(server.wait_for(|r| r.close_codes.iter().filter(|c| **c == Some(1000)).count() == 2).await);
}

#[tokio::test]
async fn failing_chain_cancels_the_others() {
    let server = scripted_server().await;
    let (tx, _rx) = mpsc::unbounded_channel();
    let pipeline = Pipeline::new(
        pipeline_config(&server.url, &["BTC-USD", "BTC-XXX"], FailurePolicy::FailFast),
        Arc::new(ChannelSink(tx)),
    );

    let result = tokio::time::timeout(Duration::from_secs(5), pipeline.run(CancellationToken::new()))
        .await
        .unwrap();
    match result {
        Err(VwapError::Subscribe(reason)) => assert_eq!(reason, "BTC-XXX is not a valid product"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn isolate_keeps_healthy_chains_running() {
    let server = scripted_server().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pipeline = Pipeline::new(
        pipeline_config(&server.url, &["BTC-XXX", "ETH-USD"], FailurePolicy::Isolate),
        Arc::new(ChannelSink(tx)),
    );

    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { pipeline.run(cancel).await }
    });

    let got = collect(&mut rx, 6).await;
    assert_eq!(got["ETH-USD"], EXPECTED);
    assert!(!run.is_finished());

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(matches!(result, Err(VwapError::Subscribe(_))), "{result:?}");
}
