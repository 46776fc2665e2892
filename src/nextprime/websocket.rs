//! WebSocket subscriber for NextPrime balance/trade streams

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures_util::StreamExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::common::errors::{ClientError, Result};
use crate::common::traits::MessageHandler;
use crate::common::types::{Credentials, SubscriptionTarget};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Everything but RFC 3986 unreserved characters, `%` included
const USERINFO: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Lifecycle of a subscriber's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Unconnected,
    Connecting,
    Streaming,
    Closed,
}

/// Why a receive loop returned without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server closed the connection or the stream ended
    Closed,
    /// The caller's shutdown signal fired
    Shutdown,
}

/// Subscriber for the balance stream of one (actor, user) pair.
///
/// `subscribe` performs the handshake, `run` then feeds every inbound
/// message to a [`MessageHandler`] in arrival order, awaiting each call
/// before reading the next frame. A finished `run` leaves the subscriber
/// `Closed`; call `subscribe` again to start a new connection.
pub struct StreamingSubscriber {
    /// Scheme and host of the streaming service, e.g. `wss://test.npri.me`
    stream_url: String,
    /// Whose balances to observe
    target: SubscriptionTarget,
    /// Basic-auth credentials
    credentials: Credentials,
    /// Limit for the TCP/TLS connect plus upgrade handshake
    connect_timeout: Option<Duration>,
    /// Limit for silence between two frames
    idle_timeout: Option<Duration>,
    state: StreamState,
    stream: Option<WsStream>,
    /// Messages handed to a handler since the last `subscribe`
    delivered: u64,
}

impl StreamingSubscriber {
    /// Create a subscriber; nothing is connected until `subscribe`.
    ///
    /// A `stream_url` without a scheme is treated as a host for `wss://`.
    pub fn new(stream_url: &str, target: SubscriptionTarget, credentials: Credentials) -> Self {
        let stream_url = if stream_url.contains("://") {
            stream_url.trim_end_matches('/').to_string()
        } else {
            format!("wss://{}", stream_url.trim_end_matches('/'))
        };

        Self {
            stream_url,
            target,
            credentials,
            connect_timeout: None,
            idle_timeout: None,
            state: StreamState::Unconnected,
            stream: None,
            delivered: 0,
        }
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, limit: Option<Duration>) -> Self {
        self.connect_timeout = limit;
        self
    }

    /// Set the idle read timeout
    pub fn with_idle_timeout(mut self, limit: Option<Duration>) -> Self {
        self.idle_timeout = limit;
        self
    }

    pub fn target(&self) -> &SubscriptionTarget {
        &self.target
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Messages delivered on the current connection
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// `wss://{user}:{api_key}@{host}/streams/{actor}/balances/{user}`.
    ///
    /// User and key are percent-encoded into the userinfo, and actor and
    /// user into their own path segments, so `%`, `:`, `@` and `/` survive.
    pub fn connect_uri(&self) -> Result<Url> {
        let mut uri = Url::parse(&self.stream_url).map_err(|e| {
            ClientError::Configuration(format!("invalid stream url {}: {}", self.stream_url, e))
        })?;

        uri.path_segments_mut()
            .map_err(|_| {
                ClientError::Configuration(format!("stream url cannot be a base: {}", self.stream_url))
            })?
            .clear()
            .extend([
                "streams",
                self.target.actor.as_str(),
                "balances",
                self.target.user.as_str(),
            ]);

        let user = utf8_percent_encode(&self.credentials.user, USERINFO).to_string();
        let api_key = utf8_percent_encode(&self.credentials.api_key, USERINFO).to_string();
        uri.set_username(&user)
            .and_then(|_| uri.set_password(Some(&api_key)))
            .map_err(|_| {
                ClientError::Configuration(format!("stream url has no host: {}", self.stream_url))
            })?;

        Ok(uri)
    }

    /// Upgrade request: credentials move from the userinfo into an
    /// `Authorization: Basic` header
    fn handshake_request(&self) -> Result<Request> {
        let mut uri = self.connect_uri()?;
        let _ = uri.set_username("");
        let _ = uri.set_password(None);

        let mut request = uri.as_str().into_client_request()?;
        let token = BASE64.encode(format!(
            "{}:{}",
            self.credentials.user, self.credentials.api_key
        ));
        let value = HeaderValue::from_str(&format!("Basic {}", token))
            .map_err(|e| ClientError::Configuration(format!("invalid credentials: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, value);

        Ok(request)
    }

    /// Open the WebSocket connection.
    ///
    /// A rejected upgrade returns `ClientError::Handshake` with the
    /// server's status code; nothing is retried.
    #[instrument(skip(self), fields(actor = %self.target.actor, user = %self.target.user))]
    pub async fn subscribe(&mut self) -> Result<()> {
        let request = self.handshake_request()?;
        info!("Connecting to balance stream: {}", request.uri());

        if self.stream.take().is_some() {
            warn!("Replacing an existing stream connection");
        }
        self.state = StreamState::Connecting;
        self.delivered = 0;

        let connect = connect_async(request);
        let outcome = match self.connect_timeout {
            Some(limit) => match timeout(limit, connect).await {
                Ok(result) => result.map_err(ClientError::from),
                Err(_) => Err(ClientError::Timeout(format!("connect exceeded {:?}", limit))),
            },
            None => connect.await.map_err(ClientError::from),
        };

        match outcome {
            Ok((stream, response)) => {
                info!("WebSocket connection established ({})", response.status());
                self.stream = Some(stream);
                self.state = StreamState::Streaming;
                Ok(())
            }
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
                self.state = StreamState::Closed;
                Err(e)
            }
        }
    }

    /// Deliver messages to `handler` until the connection closes
    pub async fn run<H>(&mut self, handler: &mut H) -> Result<()>
    where
        H: MessageHandler + ?Sized,
    {
        self.run_until(handler, std::future::pending())
            .await
            .map(|_| ())
    }

    /// Deliver messages to `handler` until the connection closes or
    /// `shutdown` completes, whichever happens first.
    ///
    /// On shutdown a close frame is sent to the server. Handler errors and
    /// malformed frames end the loop with that error.
    pub async fn run_until<H, F>(&mut self, handler: &mut H, shutdown: F) -> Result<StreamEnd>
    where
        H: MessageHandler + ?Sized,
        F: Future<Output = ()>,
    {
        let mut stream = self.stream.take().ok_or(ClientError::NotSubscribed)?;
        let result = Self::receive_loop(
            &mut stream,
            handler,
            self.idle_timeout,
            shutdown,
            &mut self.delivered,
        )
        .await;
        self.state = StreamState::Closed;
        result
    }

    async fn receive_loop<H, F>(
        stream: &mut WsStream,
        handler: &mut H,
        idle_timeout: Option<Duration>,
        shutdown: F,
        delivered: &mut u64,
    ) -> Result<StreamEnd>
    where
        H: MessageHandler + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let frame = tokio::select! {
                _ = &mut shutdown => None,
                frame = Self::next_frame(stream, idle_timeout) => Some(frame?),
            };

            let Some(frame) = frame else {
                info!("Shutdown requested after {} messages, closing stream", delivered);
                if let Err(e) = stream.close(None).await {
                    debug!("Close frame not sent: {}", e);
                }
                return Ok(StreamEnd::Shutdown);
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    handler.consume(&text).await?;
                    *delivered += 1;
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        handler.consume(&text).await?;
                        *delivered += 1;
                    }
                    Err(_) => warn!("Skipping binary frame that is not UTF-8"),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!("WebSocket closed after {} messages: {:?}", delivered, frame);
                    return Ok(StreamEnd::Closed);
                }
                Some(Ok(_)) => {
                    // Ping/pong replies are queued by tungstenite itself
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    info!("WebSocket stream ended after {} messages", delivered);
                    return Ok(StreamEnd::Closed);
                }
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    return Err(ClientError::WebSocketCommunication(e.to_string()));
                }
            }
        }
    }

    async fn next_frame(
        stream: &mut WsStream,
        idle_timeout: Option<Duration>,
    ) -> Result<Option<std::result::Result<Message, WsError>>> {
        match idle_timeout {
            Some(limit) => timeout(limit, stream.next())
                .await
                .map_err(|_| ClientError::Timeout(format!("no message within {:?}", limit))),
            None => Ok(stream.next().await),
        }
    }
}
