//! Coinbase feed JSON messages.
//!
//! Builds the subscribe / unsubscribe requests for the `matches` channel and
//! classifies inbound text frames by their `type` field:
//!
//! - `match`, `last_match` → [`FeedMessage::Match`]
//! - `subscriptions` → [`FeedMessage::Subscriptions`]
//! - `error` → [`FeedMessage::Error`]
//! - anything else (heartbeats, ...) → [`FeedMessage::Other`]

use serde::{Deserialize, Serialize};
use vwap_core::{MatchEvent, VwapError};

pub const MATCHES_CHANNEL: &str = "matches";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    #[serde(default)]
    pub product_ids: Vec<String>,
}

#[derive(Serialize)]
struct SubscribeRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    channels: [ChannelSpec; 1],
}

#[derive(Serialize)]
struct UnsubscribeRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    product_ids: Vec<&'a str>,
    channels: [&'static str; 1],
}

/// `{"type":"subscribe","channels":[{"name":"matches","product_ids":[id]}]}`
pub fn build_subscribe(product_id: &str) -> String {
    let req = SubscribeRequest {
        kind: "subscribe",
        channels: [ChannelSpec { name: MATCHES_CHANNEL.into(), product_ids: vec![product_id.into()] }],
    };
    serde_json::to_string(&req).unwrap_or_default()
}

/// `{"type":"unsubscribe","product_ids":[id],"channels":["matches"]}`.
///
/// An empty `product_id` leaves the channel entirely (`"product_ids":[]`).
pub fn build_unsubscribe(product_id: &str) -> String {
    let product_ids = if product_id.is_empty() { Vec::new() } else { vec![product_id] };
    let req = UnsubscribeRequest { kind: "unsubscribe", product_ids, channels: [MATCHES_CHANNEL] };
    serde_json::to_string(&req).unwrap_or_default()
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    Match(MatchEvent),
    Subscriptions(Vec<ChannelSpec>),
    Error { message: String, reason: String },
    Other(String),
}

impl FeedMessage {
    /// Human-readable reason for an `error` message: the `reason` field, or
    /// `message` when the server left `reason` empty.
    pub fn error_reason(message: &str, reason: &str) -> String {
        if reason.is_empty() { message.to_string() } else { reason.to_string() }
    }
}

/// Decode one inbound text frame.
///
/// Fails with [`VwapError::ProtocolRead`] when the frame is not a JSON object
/// with a string `type`, or when a trade event is malformed.
pub fn parse_message(text: &str) -> Result<FeedMessage, VwapError> {
    let v: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| VwapError::ProtocolRead(format!("invalid JSON frame: {e}")))?;

    let kind = v
        .get("type")
        .and_then(|t| t.as_str())
        .map(str::to_owned)
        .ok_or_else(|| VwapError::ProtocolRead(format!("frame without a type: {text}")))?;

    match kind.as_str() {
        "match" | "last_match" => serde_json::from_value(v)
            .map(FeedMessage::Match)
            .map_err(|e| VwapError::ProtocolRead(format!("malformed {kind} event: {e}"))),
        "subscriptions" => {
            let channels = v
                .get("channels")
                .cloned()
                .map(serde_json::from_value::<Vec<ChannelSpec>>)
                .transpose()
                .map_err(|e| VwapError::ProtocolRead(format!("malformed subscriptions: {e}")))?
                .unwrap_or_default();
            Ok(FeedMessage::Subscriptions(channels))
        }
        "error" => {
            let field = |k: &str| v.get(k).and_then(|s| s.as_str()).unwrap_or_default().to_string();
            Ok(FeedMessage::Error { message: field("message"), reason: field("reason") })
        }
        _ => Ok(FeedMessage::Other(kind)),
    }
}
