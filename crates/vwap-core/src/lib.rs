//! # vwap-core
//!
//! Core crate for the streaming VWAP engine, providing:
//!
//! - **Types** (`types`) — trade events and their enums
//! - **Configuration** (`config`) — JSON config deserialization and validation
//! - **Error types** (`error`) — domain-specific `VwapError` via thiserror
//! - **Sliding window** (`window`) — bounded overwrite-oldest FIFO
//! - **VWAP** (`vwap`) — per-instrument sliding-window calculator
//! - **Sequence tracking** (`sequence`) — stale and gap detection per product
//! - **WebSocket** (`ws`) — single connection with read deadline and keep-alive
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod sequence;
pub mod types;
pub mod vwap;
pub mod window;
pub mod ws;

// Re-export types at crate root for convenience.
pub use error::VwapError;
pub use types::*;
