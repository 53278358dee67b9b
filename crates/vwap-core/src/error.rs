//! Typed error definitions for the VWAP engine.
//!
//! Provides [`VwapError`] for domain-specific errors that are more informative
//! than plain `anyhow::Error` strings. All variants implement `std::error::Error`
//! via `thiserror`, so they integrate seamlessly with `anyhow::Result`.

use std::fmt;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Which side of a `(price, quantity)` pair failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Price,
    Quantity,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Price => write!(f, "price"),
            Self::Quantity => write!(f, "quantity"),
        }
    }
}

/// Domain-specific errors for the VWAP engine.
#[derive(Debug, Error)]
pub enum VwapError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Websocket handshake failed (DNS, TCP, TLS or HTTP upgrade). Never retried.
    #[error("failed to connect to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: Box<tungstenite::Error>,
    },

    /// An operation needed a live connection and there was none.
    #[error("not connected")]
    NotConnected,

    /// The feed rejected a subscription; carries the server-supplied reason.
    #[error("subscribe error: {0}")]
    Subscribe(String),

    /// The read side of a subscription ended: decode failure, read deadline
    /// expiry, peer close or transport error. Permanent for that connection.
    #[error("protocol read error: {0}")]
    ProtocolRead(String),

    /// A frame could not be written (or the write deadline lapsed).
    #[error("write error: {0}")]
    Write(String),

    /// A price or quantity literal is not a decimal number.
    #[error("failed to parse {operand} {value:?} as a decimal number")]
    Parse { operand: Operand, value: String },

    /// The window's cumulative volume is zero, so no VWAP exists.
    #[error("cumulative volume is zero")]
    ZeroVolume,

    /// The output sink refused a value.
    #[error("sink error: {0}")]
    Sink(String),

    /// A pipeline task panicked or was aborted.
    #[error("task failed: {0}")]
    Task(String),

    /// Deliberate shutdown. Not a failure.
    #[error("cancelled")]
    Cancelled,
}

impl VwapError {
    pub fn connection(url: &str, source: tungstenite::Error) -> Self {
        Self::Connection { url: url.to_string(), source: Box::new(source) }
    }

    /// `true` for the outcome of a deliberate shutdown.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
