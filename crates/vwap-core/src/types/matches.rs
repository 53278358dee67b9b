//! Trade events from the matches channel.

use serde::{Deserialize, Serialize};

use super::enums::{MatchKind, Side};

/// One executed trade.
///
/// `price` and `size` are kept as the decimal text the feed sent; the VWAP
/// calculator parses them itself so no precision is lost on the way. `time`
/// is the RFC 3339 timestamp as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    #[serde(rename = "type")]
    pub kind: MatchKind,
    pub trade_id: u64,
    pub sequence: u64,
    pub maker_order_id: String,
    pub taker_order_id: String,
    pub time: String,
    pub product_id: String,
    pub size: String,
    pub price: String,
    pub side: Side,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "match",
        "trade_id": 10,
        "sequence": 50,
        "maker_order_id": "ac928c66-ca53-498f-9c13-a110027a60e8",
        "taker_order_id": "132fb6ae-456b-4654-b4e0-d681ac05cea1",
        "time": "2014-11-07T08:19:27.028459Z",
        "product_id": "BTC-USD",
        "size": "5.23512",
        "price": "400.23",
        "side": "sell"
    }"#;

    #[test]
    fn decode_match_event() {
        let ev: MatchEvent = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(ev.kind, MatchKind::Match);
        assert_eq!(ev.trade_id, 10);
        assert_eq!(ev.sequence, 50);
        assert_eq!(ev.product_id, "BTC-USD");
        assert_eq!(ev.price, "400.23");
        assert_eq!(ev.size, "5.23512");
        assert_eq!(ev.side, Side::Sell);
        assert_eq!(ev.time, "2014-11-07T08:19:27.028459Z");
    }

    #[test]
    fn decode_rejects_missing_price() {
        let without_price = SAMPLE.replace("\"price\": \"400.23\",", "");
        assert!(serde_json::from_str::<MatchEvent>(&without_price).is_err());
    }
}
