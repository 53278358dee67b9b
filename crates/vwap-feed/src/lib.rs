//! # vwap-feed
//!
//! Coinbase `matches` feed client and the per-product VWAP pipeline.
//!
//! ## Architecture
//!
//! [`pipeline::Pipeline`] spawns one chain per product: a feed stage that
//! relays trade events from its own websocket connection, an aggregation
//! stage that turns them into VWAP values, and a sink stage that hands each
//! value to a [`VwapSink`].
//!
//! ## Modules
//!
//! - [`coinbase`] — feed protocol client and subscriptions
//! - [`feed_worker`] — feed stage
//! - [`aggregate_worker`] — aggregation and sink stages
//! - [`pipeline`] — chain wiring, cancellation and failure policy

pub mod aggregate_worker;
pub mod coinbase;
pub mod feed_worker;
pub mod pipeline;

use anyhow::Result;
use async_trait::async_trait;

/// Destination for computed VWAP values.
///
/// Called from one sink task per product, possibly concurrently across
/// products, hence `Sync`.
#[async_trait]
pub trait VwapSink: Send + Sync {
    /// Deliver one formatted VWAP for `product_id`.
    async fn emit(&self, product_id: &str, vwap: &str) -> Result<()>;
}
