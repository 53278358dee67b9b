//! Websocket transport: handshake, deadline-bounded reads and writes, keep-alive.

pub mod client;

pub use client::{WsConnConfig, WsReceiver, WsStream, WsWriter, connect, run_pinger};
pub use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
