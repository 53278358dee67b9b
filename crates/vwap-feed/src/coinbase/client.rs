//! `matches` channel client.
//!
//! Lifecycle: disconnected → [`connect`](MatchesClient::connect) →
//! [`subscribe`](MatchesClient::subscribe) → streaming via [`Subscription`] →
//! [`Subscription::stop`]. One client carries at most one live subscription.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vwap_core::ws::{self, WsConnConfig, WsReceiver, WsWriter};
use vwap_core::{MatchEvent, VwapError};

use super::json_parser::{self, FeedMessage};
use super::subscription::Subscription;

struct Connection {
    url: String,
    writer: WsWriter,
    /// Taken by the subscription's reader task.
    receiver: Option<WsReceiver>,
}

/// Client for the Coinbase websocket feed `matches` channel.
pub struct MatchesClient {
    config: WsConnConfig,
    cancel: CancellationToken,
    conn: Option<Connection>,
}

impl MatchesClient {
    pub fn new(config: WsConnConfig) -> Self {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// Subscriptions created by this client are cancelled together with `parent`.
    pub fn with_cancellation(config: WsConnConfig, parent: CancellationToken) -> Self {
        Self { config, cancel: parent, conn: None }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Open the websocket connection. No retry on failure.
    pub async fn connect(&mut self, url: &str) -> Result<(), VwapError> {
        let (writer, receiver) = ws::connect(url, &self.config).await?;
        self.conn = Some(Connection { url: url.to_string(), writer, receiver: Some(receiver) });
        Ok(())
    }

    /// Subscribe to `product_id` on the `matches` channel.
    ///
    /// Waits at most `pong_wait` for the server's response. An `error`
    /// response fails with [`VwapError::Subscribe`] carrying the server's
    /// reason; the connection then stays usable for another attempt.
    ///
    /// The returned subscription buffers up to `window_width` events.
    pub async fn subscribe(&mut self, product_id: &str, window_width: usize) -> Result<Subscription, VwapError> {
        let pong_wait = self.config.pong_wait;
        let conn = self.conn.as_mut().ok_or(VwapError::NotConnected)?;
        let mut receiver = conn
            .receiver
            .take()
            .ok_or_else(|| VwapError::Subscribe("connection already has an active subscription".into()))?;

        let label = format!("coinbase-{product_id}");
        let request = json_parser::build_subscribe(product_id);
        debug!("[{label}] subscribing: {request}");
        if let Err(e) = conn.writer.send_text(&request).await {
            conn.receiver = Some(receiver);
            return Err(e);
        }

        let response = match tokio::time::timeout(pong_wait, receiver.recv()).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(VwapError::ProtocolRead(format!(
                    "no response to subscribe within {pong_wait:?}"
                )));
            }
        };

        let mut first_event: Option<MatchEvent> = None;
        match json_parser::parse_message(&response) {
            Ok(FeedMessage::Error { message, reason }) => {
                let reason = FeedMessage::error_reason(&message, &reason);
                warn!("[{label}] subscribe rejected: {reason}");
                conn.receiver = Some(receiver);
                return Err(VwapError::Subscribe(reason));
            }
            Ok(FeedMessage::Subscriptions(channels)) => {
                debug!("[{label}] subscribed: {channels:?}");
            }
            Ok(FeedMessage::Match(ev)) => first_event = Some(ev),
            Ok(FeedMessage::Other(kind)) => debug!("[{label}] subscribe answered with {kind}"),
            Err(e) => return Err(e),
        }
        info!("[{label}] subscribed to {} on {}", json_parser::MATCHES_CHANNEL, conn.url);

        receiver.arm_deadline();
        let (events_tx, events_rx) = mpsc::channel(window_width.max(1));
        if let Some(ev) = first_event {
            // Fresh channel with capacity >= 1.
            let _ = events_tx.try_send(ev);
        }

        Ok(Subscription::spawn(
            product_id.to_string(),
            conn.writer.clone(),
            receiver,
            events_tx,
            events_rx,
            self.config.ping_period(),
            self.cancel.child_token(),
        ))
    }

    /// Leave the `matches` channel for `product_id`, or for every product when
    /// it is empty. Fire-and-forget: no acknowledgement is awaited.
    pub async fn unsubscribe(&self, product_id: &str) -> Result<(), VwapError> {
        let conn = self.conn.as_ref().ok_or(VwapError::NotConnected)?;
        conn.writer.send_text(&json_parser::build_unsubscribe(product_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_without_connection_fails() {
        let mut client = MatchesClient::new(WsConnConfig::default());
        assert!(!client.is_connected());
        assert!(matches!(client.subscribe("BTC-USD", 10).await, Err(VwapError::NotConnected)));
        assert!(matches!(client.unsubscribe("").await, Err(VwapError::NotConnected)));
    }
}
