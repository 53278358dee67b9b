//! Single websocket connection with read deadlines and ping keep-alive.
//!
//! [`connect`] performs the handshake and splits the stream into:
//! 1. [`WsWriter`], a cloneable handle that serializes frame writes and bounds
//!    each by `write_wait`.
//! 2. [`WsReceiver`], the read half. It answers control frames, enforces the
//!    pong-driven read deadline and yields text frames.
//!
//! There is no reconnect. Any transport failure is terminal for the
//! connection and is reported to the caller.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::VwapError;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for a single websocket connection.
#[derive(Debug, Clone)]
pub struct WsConnConfig {
    /// Extra HTTP headers for the handshake.
    pub extra_headers: HashMap<String, String>,
    /// Inbound message and frame size ceiling in bytes.
    pub max_message_size: usize,
    /// Read deadline once armed; every pong pushes it forward by this much.
    pub pong_wait: Duration,
    /// Upper bound for a single frame write.
    pub write_wait: Duration,
    /// How long [`WsReceiver::shutdown`] waits for the close acknowledgement.
    pub close_wait: Duration,
    /// Ping interval override. See [`WsConnConfig::ping_period`].
    pub ping_period: Option<Duration>,
}

impl Default for WsConnConfig {
    fn default() -> Self {
        Self {
            extra_headers: HashMap::new(),
            max_message_size: 32 * 1024,
            pong_wait: Duration::from_secs(5),
            write_wait: Duration::from_secs(10),
            close_wait: Duration::from_secs(1),
            ping_period: None,
        }
    }
}

impl WsConnConfig {
    /// Effective ping interval: the override, or 9/10 of `pong_wait`.
    pub fn ping_period(&self) -> Duration {
        self.ping_period.unwrap_or(self.pong_wait * 9 / 10)
    }
}

/// Establish a websocket connection (TLS for `wss://`) and split it.
///
/// Fails with [`VwapError::Connection`] on DNS, TCP, TLS or upgrade errors.
/// No retry is attempted.
pub async fn connect(url: &str, config: &WsConnConfig) -> Result<(WsWriter, WsReceiver), VwapError> {
    let mut request = url.into_client_request().map_err(|e| VwapError::connection(url, e))?;

    for (key, value) in &config.extra_headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| VwapError::Config(format!("invalid header name {key:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| VwapError::Config(format!("invalid value for header {key:?}: {e}")))?;
        request.headers_mut().insert(name, value);
    }

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_size);
    ws_config.max_frame_size = Some(config.max_message_size);

    debug!("[ws] connecting to {url}");
    let (stream, _response) =
        tokio_tungstenite::connect_async_with_config(request, Some(ws_config), false)
            .await
            .map_err(|e| VwapError::connection(url, e))?;
    info!("[ws] connected to {url}");

    let (sink, stream) = stream.split();
    let writer = WsWriter {
        inner: Arc::new(WriterInner {
            sink: tokio::sync::Mutex::new(sink),
            write_wait: config.write_wait,
            close_sent: AtomicBool::new(false),
        }),
    };
    let receiver = WsReceiver {
        stream,
        writer: writer.clone(),
        pong_wait: config.pong_wait,
        close_wait: config.close_wait,
        deadline: None,
    };
    Ok((writer, receiver))
}

// ---------------------------------------------------------------------------
// Write half
// ---------------------------------------------------------------------------

struct WriterInner {
    sink: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    write_wait: Duration,
    close_sent: AtomicBool,
}

/// Shared write half. Clones write to the same connection, one frame at a time.
#[derive(Clone)]
pub struct WsWriter {
    inner: Arc<WriterInner>,
}

impl WsWriter {
    /// Write one frame, bounded by `write_wait`.
    pub async fn send(&self, msg: Message) -> Result<(), VwapError> {
        let inner = &self.inner;
        within(inner.write_wait, async move { inner.sink.lock().await.send(msg).await }).await
    }

    pub async fn send_text(&self, text: &str) -> Result<(), VwapError> {
        self.send(Message::Text(text.to_owned().into())).await
    }

    pub async fn ping(&self) -> Result<(), VwapError> {
        self.send(Message::Ping(Vec::new().into())).await
    }

    /// Initiate the close handshake with `code`.
    pub async fn close(&self, code: CloseCode) -> Result<(), VwapError> {
        self.inner.close_sent.store(true, Ordering::Release);
        self.send(Message::Close(Some(CloseFrame { code, reason: "".into() }))).await
    }

    /// Answer a peer-initiated close. The transport has already queued a
    /// close frame echoing the peer's status code; this flushes it.
    pub async fn echo_close(&self) -> Result<(), VwapError> {
        if self.inner.close_sent.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let inner = &self.inner;
        within(inner.write_wait, async move { inner.sink.lock().await.flush().await }).await
    }

    /// `true` once this side has sent (or echoed) a close frame.
    pub fn close_sent(&self) -> bool {
        self.inner.close_sent.load(Ordering::Acquire)
    }
}

async fn within<F>(wait: Duration, write: F) -> Result<(), VwapError>
where
    F: Future<Output = Result<(), tungstenite::Error>>,
{
    match tokio::time::timeout(wait, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(VwapError::Write(e.to_string())),
        Err(_) => Err(VwapError::Write(format!("write deadline of {wait:?} exceeded"))),
    }
}

// ---------------------------------------------------------------------------
// Read half
// ---------------------------------------------------------------------------

/// Read half of a connection.
pub struct WsReceiver {
    stream: SplitStream<WsStream>,
    writer: WsWriter,
    pong_wait: Duration,
    close_wait: Duration,
    deadline: Option<Instant>,
}

impl WsReceiver {
    /// Start enforcing the read deadline: `pong_wait` from now.
    pub fn arm_deadline(&mut self) {
        self.deadline = Some(Instant::now() + self.pong_wait);
    }

    /// Next inbound text frame.
    ///
    /// Pongs push the armed deadline forward; pings are answered by the
    /// transport. A peer close is echoed with its status code and ends the
    /// stream with [`VwapError::ProtocolRead`], as do deadline expiry,
    /// transport errors and binary frames.
    pub async fn recv(&mut self) -> Result<String, VwapError> {
        loop {
            let next = match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, self.stream.next())
                    .await
                    .map_err(|_| {
                        VwapError::ProtocolRead(format!(
                            "read deadline exceeded: no pong within {:?}",
                            self.pong_wait
                        ))
                    })?,
                None => self.stream.next().await,
            };

            match next {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Pong(_))) => {
                    if self.deadline.is_some() {
                        self.arm_deadline();
                    }
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Binary(data))) => {
                    return Err(VwapError::ProtocolRead(format!(
                        "unexpected binary frame of {} bytes",
                        data.len()
                    )));
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Err(e) = self.writer.echo_close().await {
                        debug!("[ws] close echo failed: {e}");
                    }
                    let code = frame.map(|f| u16::from(f.code));
                    return Err(VwapError::ProtocolRead(match code {
                        Some(code) => format!("connection closed by peer with code {code}"),
                        None => "connection closed by peer".to_string(),
                    }));
                }
                Some(Err(e)) => return Err(VwapError::ProtocolRead(e.to_string())),
                None => return Err(VwapError::ProtocolRead("connection closed".into())),
            }
        }
    }

    /// Send a normal-closure frame and wait up to `close_wait` for the peer's
    /// acknowledgement. Failures are logged; the connection is gone either way.
    pub async fn shutdown(mut self) {
        if !self.writer.close_sent() {
            if let Err(e) = self.writer.close(CloseCode::Normal).await {
                debug!("[ws] close frame not sent: {e}");
                return;
            }
        }
        let close_wait = self.close_wait;
        let stream = &mut self.stream;
        let drain = async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Close(_)) | Err(_) => return,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(close_wait, drain).await.is_err() {
            warn!("[ws] peer did not acknowledge close within {close_wait:?}");
        }
    }
}

/// Send a ping every `period` until cancelled or a write fails.
///
/// The first ping goes out one full period after the call.
pub async fn run_pinger(
    writer: WsWriter,
    period: Duration,
    cancel: CancellationToken,
) -> Result<(), VwapError> {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => writer.ping().await?,
        }
    }
}
