//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;

use nextprime_client::{ClientError, Credentials, MessageHandler, Result, SubscriptionTarget};

pub const USER: &str = "alice";
pub const API_KEY: &str = "s3cr:et@key/";

pub fn credentials() -> Credentials {
    Credentials::new(USER, API_KEY)
}

pub fn target(actor: Option<&str>) -> SubscriptionTarget {
    SubscriptionTarget::new(actor, USER)
}

/// Sample API responses for testing
pub mod api_responses {
    /// Balances for a single trader
    pub const ALICE_BALANCES: &str =
        r#"{"alice": {"usd": {"balance": "100", "available": "90"}}}"#;

    /// Balances returned after a trade
    pub const TRADE_BALANCES: &str =
        r#"{"alice": {"usd": {"balance": "1847.00", "available": "1847.00"}, "btc": {"balance": "0", "available": "0"}}}"#;
}

/// Sample stream frames for testing
pub mod ws_messages {
    pub const BALANCE_1: &str = r#"{"alice": {"usd": {"balance": "100", "available": "90"}}}"#;
    pub const BALANCE_2: &str = r#"{"alice": {"usd": {"balance": "110", "available": "100"}}}"#;
    pub const TRADE: &str = r#"{"txid": "tx-1", "side": "SELL", "symbol": "BTCUSD", "price": "17.47"}"#;
}

// ============================================================================
// Recording handler
// ============================================================================

/// Handler that records every call boundary to check ordering
#[derive(Default)]
pub struct Recorder {
    pub events: Vec<String>,
    pub messages: Vec<serde_json::Value>,
    in_flight: Arc<AtomicUsize>,
    pub max_in_flight: usize,
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn consume(&mut self, message: &str) -> Result<()> {
        let n = self.messages.len();
        let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight = self.max_in_flight.max(active);
        self.events.push(format!("start {}", n));

        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        self.messages.push(serde_json::from_str(message)?);
        self.events.push(format!("end {}", n));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Handler that fails on the given message index
pub struct FailingHandler {
    pub fail_at: usize,
    pub seen: usize,
}

#[async_trait]
impl MessageHandler for FailingHandler {
    async fn consume(&mut self, _message: &str) -> Result<()> {
        if self.seen == self.fail_at {
            return Err(ClientError::Protocol("handler refused message".to_string()));
        }
        self.seen += 1;
        Ok(())
    }
}

// ============================================================================
// In-process WebSocket server
// ============================================================================

/// What the server does with one incoming connection
#[derive(Debug, Clone)]
pub enum Script {
    /// Accept the upgrade, send `frames`, then close or stay open
    Accept { frames: Vec<Message>, hold_open: bool },
    /// Answer the upgrade request with a plain HTTP status
    Reject(u16),
}

impl Script {
    pub fn send_and_close(frames: &[&str]) -> Self {
        Self::send_messages(text_frames(frames), false)
    }

    pub fn send_and_hold(frames: &[&str]) -> Self {
        Self::send_messages(text_frames(frames), true)
    }

    /// Send arbitrary frames, binary included
    pub fn send_messages(frames: Vec<Message>, hold_open: bool) -> Self {
        Script::Accept { frames, hold_open }
    }
}

fn text_frames(frames: &[&str]) -> Vec<Message> {
    frames.iter().map(|f| Message::Text(f.to_string())).collect()
}

/// Accept TCP connections and never answer the upgrade request.
///
/// Returns the `ws://` URL and a handle to abort when done.
pub async fn spawn_silent_server() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((tcp, _)) = listener.accept().await {
            held.push(tcp);
        }
    });

    (url, handle)
}

/// Request details seen by the server during a handshake
#[derive(Debug, Clone, Default)]
pub struct Captured {
    pub path: String,
    pub authorization: Option<String>,
}

/// Start a server handling one connection per script, in order.
///
/// Returns the `ws://` base URL and a handle yielding captured handshakes.
pub async fn spawn_ws_server(scripts: Vec<Script>) -> (String, JoinHandle<Vec<Captured>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut captured = Vec::new();

        for script in scripts {
            let (mut tcp, _) = listener.accept().await.unwrap();

            match script {
                Script::Reject(status) => {
                    let mut buf = vec![0u8; 4096];
                    let _ = tcp.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {} Rejected\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        status
                    );
                    tcp.write_all(response.as_bytes()).await.unwrap();
                    let _ = tcp.shutdown().await;
                    captured.push(Captured::default());
                }
                Script::Accept { frames, hold_open } => {
                    let seen = Arc::new(Mutex::new(Captured::default()));
                    let seen_cb = seen.clone();
                    let callback = move |req: &Request,
                                         resp: Response|
                          -> std::result::Result<Response, ErrorResponse> {
                        let mut seen = seen_cb.lock().unwrap();
                        seen.path = req.uri().path().to_string();
                        seen.authorization = req
                            .headers()
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        Ok(resp)
                    };

                    let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
                        .await
                        .unwrap();

                    for frame in frames {
                        ws.send(frame).await.unwrap();
                    }

                    if hold_open {
                        while let Some(Ok(msg)) = ws.next().await {
                            if msg.is_close() {
                                break;
                            }
                        }
                    } else {
                        let _ = ws.close(None).await;
                        // drain until the client acknowledges the close
                        while let Some(Ok(_)) = ws.next().await {}
                    }

                    let seen = seen.lock().unwrap().clone();
                    captured.push(seen);
                }
            }
        }

        captured
    });

    (url, handle)
}
