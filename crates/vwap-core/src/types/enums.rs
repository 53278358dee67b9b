//! Enumerations carried by trade events.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Trade side
// ---------------------------------------------------------------------------

/// Side of the *maker* order.
///
/// `Sell` means the taker bought (an up-tick); `Buy` means the taker sold
/// (a down-tick).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

// ---------------------------------------------------------------------------
// Event kind
// ---------------------------------------------------------------------------

/// Kind of a matches-channel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The most recent trade, sent once right after subscribing.
    LastMatch,
    /// An ordinary trade.
    Match,
}
