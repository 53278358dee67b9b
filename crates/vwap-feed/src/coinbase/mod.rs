//! Coinbase Exchange websocket feed, `matches` channel.
//!
//! - [`client`] — connect / subscribe / unsubscribe
//! - [`subscription`] — reader + pinger tasks and the event stream
//! - [`json_parser`] — request builders and inbound frame decoding

pub mod client;
pub mod json_parser;
pub mod subscription;

pub use client::MatchesClient;
pub use json_parser::FeedMessage;
pub use subscription::Subscription;
