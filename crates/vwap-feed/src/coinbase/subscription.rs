//! A live `matches` subscription.
//!
//! Two tasks share one cancellation token:
//!
//! - the **reader** decodes inbound frames and pushes trade events onto a
//!   bounded queue (a full queue blocks it; there is no drop-oldest), and
//! - the **pinger** keeps the read deadline alive.
//!
//! Whichever task ends first cancels the other. Both report into a
//! capacity-2 outcome channel; the first report is the subscription's
//! terminal outcome.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vwap_core::ws::{self, WsReceiver, WsWriter};
use vwap_core::{MatchEvent, VwapError};

use super::json_parser::{self, FeedMessage};

type Outcome = Result<(), VwapError>;

/// Event stream and lifecycle handle for one product.
pub struct Subscription {
    product_id: String,
    writer: WsWriter,
    events: mpsc::Receiver<MatchEvent>,
    outcome: mpsc::Receiver<Outcome>,
    outcome_taken: bool,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Subscription {
    pub(super) fn spawn(
        product_id: String,
        writer: WsWriter,
        receiver: WsReceiver,
        events_tx: mpsc::Sender<MatchEvent>,
        events: mpsc::Receiver<MatchEvent>,
        ping_period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let label = format!("coinbase-{product_id}");
        let (outcome_tx, outcome) = mpsc::channel::<Outcome>(2);

        let reader = {
            let outcome_tx = outcome_tx.clone();
            let cancel = cancel.clone();
            let label = label.clone();
            tokio::spawn(async move {
                let result = read_matches(receiver, events_tx, cancel.clone(), &label).await;
                match &result {
                    Ok(()) => debug!("[{label}] reader stopped"),
                    Err(e) => warn!("[{label}] reader failed: {e}"),
                }
                let _ = outcome_tx.try_send(result);
                cancel.cancel();
            })
        };

        let pinger = {
            let writer = writer.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let result = ws::run_pinger(writer, ping_period, cancel.clone()).await;
                if let Err(e) = &result {
                    warn!("[{label}] pinger failed: {e}");
                }
                let _ = outcome_tx.try_send(result);
                cancel.cancel();
            })
        };

        Self {
            product_id,
            writer,
            events,
            outcome,
            outcome_taken: false,
            cancel,
            tasks: vec![reader, pinger],
        }
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Next trade event. `None` once the reader has ended and the buffer is
    /// drained.
    pub async fn next(&mut self) -> Option<MatchEvent> {
        self.events.recv().await
    }

    /// Wait for the terminal outcome.
    ///
    /// Only the first caller observes it (here or in [`stop`](Self::stop));
    /// later calls return `Ok(())` immediately.
    pub async fn done(&mut self) -> Result<(), VwapError> {
        if self.outcome_taken {
            return Ok(());
        }
        let outcome = self.outcome.recv().await.unwrap_or(Ok(()));
        self.outcome_taken = true;
        outcome
    }

    /// Close the connection, join both tasks and release the event stream.
    ///
    /// Returns the terminal outcome unless [`done`](Self::done) already
    /// consumed it. Idempotent.
    pub async fn stop(&mut self) -> Result<(), VwapError> {
        self.cancel.cancel();

        let mut join_err = None;
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("[coinbase-{}] task join failed: {e}", self.product_id);
                join_err.get_or_insert(VwapError::Task(e.to_string()));
            }
        }
        self.events.close();

        if self.outcome_taken {
            return Ok(());
        }
        self.outcome_taken = true;
        match (self.outcome.try_recv(), join_err) {
            (Ok(Err(e)), _) => Err(e),
            (_, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }

    /// Leave the `matches` channel for `product_id` (all products when empty).
    /// Fire-and-forget.
    pub async fn unsubscribe(&self, product_id: &str) -> Result<(), VwapError> {
        self.writer.send_text(&json_parser::build_unsubscribe(product_id)).await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Reader loop
// ---------------------------------------------------------------------------

/// Read frames until cancellation or the first error. On cancellation the
/// connection is closed with a normal-closure handshake.
async fn read_matches(
    mut receiver: WsReceiver,
    events: mpsc::Sender<MatchEvent>,
    cancel: CancellationToken,
    label: &str,
) -> Result<(), VwapError> {
    loop {
        let text = tokio::select! {
            _ = cancel.cancelled() => break,
            text = receiver.recv() => text?,
        };

        match json_parser::parse_message(&text)? {
            FeedMessage::Match(ev) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = events.send(ev) => {
                        if sent.is_err() {
                            debug!("[{label}] event consumer gone");
                            break;
                        }
                    }
                }
            }
            FeedMessage::Error { message, reason } => {
                return Err(VwapError::ProtocolRead(format!(
                    "feed error: {}",
                    FeedMessage::error_reason(&message, &reason)
                )));
            }
            FeedMessage::Subscriptions(channels) => debug!("[{label}] subscriptions: {channels:?}"),
            FeedMessage::Other(kind) => debug!("[{label}] ignoring {kind} message"),
        }
    }

    info!("[{label}] closing connection");
    receiver.shutdown().await;
    Ok(())
}
