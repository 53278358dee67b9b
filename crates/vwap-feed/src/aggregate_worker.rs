//! Aggregation and sink stages.
//!
//! [`run_aggregator`] folds trade events into a [`Calculator`] after checking
//! their sequence, and forwards each VWAP string. [`run_sink`] hands those
//! strings to a [`VwapSink`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vwap_core::sequence::{SequenceCheck, SequenceTracker};
use vwap_core::vwap::Calculator;
use vwap_core::{MatchEvent, VwapError};

use crate::VwapSink;

/// Drain `events` into a fresh calculator of width `window`.
///
/// Stale sequences are skipped without touching the window; gaps are logged.
/// A zero-volume window is logged and skipped. Any other calculator error ends
/// the stage. Returns `Ok` when `events` closes and
/// [`VwapError::Cancelled`] on cancellation.
pub async fn run_aggregator(
    product_id: &str,
    window: usize,
    mut events: mpsc::Receiver<MatchEvent>,
    results: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> Result<(), VwapError> {
    let label = format!("vwap-{product_id}");
    let calc = Calculator::new(window);
    let mut sequences = SequenceTracker::new();

    info!("[{label}] aggregator started (window {window})");

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return Err(VwapError::Cancelled),
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match sequences.check(event.sequence) {
            SequenceCheck::Stale { last } => {
                debug!("[{label}] skipping stale sequence {} (last {last})", event.sequence);
                continue;
            }
            SequenceCheck::Gap { missed } => {
                warn!("[{label}] sequence gap before {}: {missed} missed", event.sequence);
            }
            SequenceCheck::First | SequenceCheck::InOrder => {}
        }

        let vwap = match calc.update(&event.price, &event.size) {
            Ok(vwap) => vwap,
            Err(VwapError::ZeroVolume) => {
                warn!("[{label}] zero volume in window after trade {}", event.trade_id);
                continue;
            }
            Err(e) => return Err(e),
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(VwapError::Cancelled),
            sent = results.send(vwap) => {
                if sent.is_err() {
                    debug!("[{label}] sink gone");
                    break;
                }
            }
        }
    }

    info!("[{label}] aggregator exited");
    Ok(())
}

/// Emit every VWAP from `results` to `sink` until cancelled or the queue
/// closes.
pub async fn run_sink(
    product_id: &str,
    mut results: mpsc::Receiver<String>,
    sink: Arc<dyn VwapSink>,
    cancel: CancellationToken,
) -> Result<(), VwapError> {
    loop {
        let vwap = tokio::select! {
            _ = cancel.cancelled() => return Err(VwapError::Cancelled),
            vwap = results.recv() => match vwap {
                Some(vwap) => vwap,
                None => return Ok(()),
            },
        };
        sink.emit(product_id, &vwap)
            .await
            .map_err(|e| VwapError::Sink(format!("{product_id}: {e}")))?;
    }
}
