//! Feed stage: one Coinbase connection relaying trade events for one product.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vwap_core::ws::WsConnConfig;
use vwap_core::{MatchEvent, VwapError};

use crate::coinbase::{MatchesClient, Subscription};

/// Parameters for one product's feed stage.
pub struct FeedParams {
    pub url: String,
    pub connection: WsConnConfig,
    pub product_id: String,
    pub window: usize,
    pub events: mpsc::Sender<MatchEvent>,
}

/// Connect, subscribe and relay events into `events` until cancelled.
///
/// Returns [`VwapError::Cancelled`] after stopping the subscription when
/// `cancel` fires. When the subscription ends on its own, returns its outcome.
pub async fn run_feed(params: FeedParams, cancel: CancellationToken) -> Result<(), VwapError> {
    let FeedParams { url, connection, product_id, window, events } = params;
    let label = format!("feed-{product_id}");

    let mut client = MatchesClient::with_cancellation(connection, cancel.clone());
    tokio::select! {
        _ = cancel.cancelled() => return Err(VwapError::Cancelled),
        connected = client.connect(&url) => connected?,
    }
    let mut subscription = tokio::select! {
        _ = cancel.cancelled() => return Err(VwapError::Cancelled),
        subscribed = client.subscribe(&product_id, window) => subscribed?,
    };
    info!("[{label}] streaming");

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return stop_cancelled(&label, &mut subscription).await,
            event = subscription.next() => event,
        };

        let Some(event) = event else {
            if cancel.is_cancelled() {
                return stop_cancelled(&label, &mut subscription).await;
            }
            let outcome = subscription.stop().await;
            match &outcome {
                Ok(()) => info!("[{label}] subscription ended"),
                Err(e) => warn!("[{label}] subscription ended: {e}"),
            }
            return outcome;
        };

        tokio::select! {
            _ = cancel.cancelled() => return stop_cancelled(&label, &mut subscription).await,
            sent = events.send(event) => {
                if sent.is_err() {
                    debug!("[{label}] aggregator gone, stopping");
                    return subscription.stop().await;
                }
            }
        }
    }
}

async fn stop_cancelled(label: &str, subscription: &mut Subscription) -> Result<(), VwapError> {
    if let Err(e) = subscription.stop().await {
        debug!("[{label}] subscription outcome during shutdown: {e}");
    }
    info!("[{label}] stopped");
    Err(VwapError::Cancelled)
}
