//! In-process fake of the Coinbase websocket feed.
//!
//! Each accepted connection waits for the client's first text frame (the
//! subscribe request), runs the script for the requested product, then keeps
//! reading so pings are answered and close frames are recorded.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};

/// One scripted server action.
pub enum Step {
    /// Send a text frame.
    Send(String),
    /// Start the close handshake with this status code.
    Close(u16),
    /// Drop the TCP connection without a close handshake.
    Drop,
    /// Stop reading (and therefore stop answering pings) for a while.
    Stall(Duration),
}

#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub texts: Vec<String>,
    pub close_codes: Vec<Option<u16>>,
}

type Script = Arc<dyn Fn(&str) -> Vec<Step> + Send + Sync>;

pub struct FakeFeedServer {
    pub url: String,
    recorded: Arc<Mutex<Recorded>>,
    accept_task: JoinHandle<()>,
}

impl FakeFeedServer {
    /// Bind to a loopback port. `script` receives the product id of each
    /// connection's subscribe request.
    pub async fn start<F>(script: F) -> Self
    where
        F: Fn(&str) -> Vec<Step> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let script: Script = Arc::new(script);

        let rec = recorded.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let (script, rec) = (script.clone(), rec.clone());
                tokio::spawn(async move {
                    let _ = serve(tcp, script, rec).await;
                });
            }
        });

        Self { url, recorded, accept_task }
    }

    pub fn recorded(&self) -> Recorded {
        self.recorded.lock().clone()
    }

    /// Poll the recording until `pred` holds, for up to three seconds.
    pub async fn wait_for(&self, pred: impl Fn(&Recorded) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        while tokio::time::Instant::now() < deadline {
            if pred(&self.recorded.lock()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

impl Drop for FakeFeedServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve(tcp: TcpStream, script: Script, rec: Arc<Mutex<Recorded>>) -> Result<(), tungstenite::Error> {
    let mut ws = tokio_tungstenite::accept_async(tcp).await?;
    let mut scripted = false;

    while let Some(msg) = ws.next().await {
        match msg? {
            Message::Text(text) => {
                let text = text.as_str().to_owned();
                rec.lock().texts.push(text.clone());
                if scripted {
                    continue;
                }
                scripted = true;
                let product = subscribed_product(&text).unwrap_or_default();
                for step in script(&product) {
                    match step {
                        Step::Send(t) => ws.send(Message::Text(t.into())).await?,
                        Step::Close(code) => {
                            let frame = CloseFrame { code: CloseCode::from(code), reason: "".into() };
                            ws.send(Message::Close(Some(frame))).await?;
                        }
                        Step::Drop => return Ok(()),
                        Step::Stall(d) => tokio::time::sleep(d).await,
                    }
                }
            }
            Message::Close(frame) => rec.lock().close_codes.push(frame.map(|f| u16::from(f.code))),
            _ => {}
        }
    }
    Ok(())
}

fn subscribed_product(request: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(request).ok()?;
    v["channels"][0]["product_ids"][0].as_str().map(str::to_string)
}

// ---------------------------------------------------------------------------
// Feed messages
// ---------------------------------------------------------------------------

pub fn subscriptions_ack(product_id: &str) -> String {
    serde_json::json!({
        "type": "subscriptions",
        "channels": [{ "name": "matches", "product_ids": [product_id] }]
    })
    .to_string()
}

pub fn error_reply(reason: &str) -> String {
    serde_json::json!({ "type": "error", "message": "Failed to subscribe", "reason": reason }).to_string()
}

pub fn trade(product_id: &str, sequence: u64, price: &str, size: &str) -> String {
    serde_json::json!({
        "type": if sequence == 1 { "last_match" } else { "match" },
        "trade_id": 1000 + sequence,
        "sequence": sequence,
        "maker_order_id": "ac928c66-ca53-498f-9c13-a110027a60e8",
        "taker_order_id": "132fb6ae-456b-4654-b4e0-d681ac05cea1",
        "time": "2022-03-01T12:00:00.000000Z",
        "product_id": product_id,
        "size": size,
        "price": price,
        "side": "sell"
    })
    .to_string()
}

/// Prices 1..=6 with quantities 2, 3, 5, 7, 11, 13.
pub fn sample_trades(product_id: &str) -> Vec<Step> {
    let quantities = ["2", "3", "5", "7", "11", "13"];
    quantities
        .iter()
        .enumerate()
        .map(|(i, q)| Step::Send(trade(product_id, i as u64 + 1, &(i + 1).to_string(), q)))
        .collect()
}
