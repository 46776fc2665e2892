//! Error types for the client

use thiserror::Error;

/// Result type alias using our ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

/// Main error type for client operations
///
/// Nothing in this layer retries: every variant is surfaced to the caller
/// as soon as it happens.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Non-success HTTP status, or a success status with an unreadable body
    #[error("Transport error (HTTP {status}): {message}")]
    Transport { status: u16, message: String },

    /// Response violates the expected contract
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// WebSocket upgrade rejected by the server
    #[error("WebSocket handshake rejected with status {status}")]
    Handshake { status: u16 },

    /// Inbound stream frame is not valid JSON
    #[error("Message decode error: {0}")]
    MessageDecode(#[from] serde_json::Error),

    /// HTTP request errors raised before any status was received
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// WebSocket connection errors
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    /// WebSocket send/receive errors
    #[error("WebSocket communication error: {0}")]
    WebSocketCommunication(String),

    /// `run` called without a live subscription
    #[error("Not subscribed: call subscribe() before run()")]
    NotSubscribed,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Message could not be rendered as a YAML document
    #[error("Render error: {0}")]
    Render(#[from] serde_yaml::Error),

    /// Writing to the output sink failed
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}

impl ClientError {
    /// HTTP or handshake status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Transport { status, .. } | ClientError::Handshake { status } => {
                Some(*status)
            }
            ClientError::HttpRequest(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::Http(response) => ClientError::Handshake {
                status: response.status().as_u16(),
            },
            WsError::Io(e) => ClientError::WebSocketConnection(e.to_string()),
            other => ClientError::WebSocketCommunication(other.to_string()),
        }
    }
}
