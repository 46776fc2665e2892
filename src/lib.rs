//! NextPrime client library
//!
//! Authenticated REST calls (ping, balances, trade submission) and a
//! WebSocket subscriber streaming balance/trade updates to a handler.

pub mod common;
pub mod config;
pub mod nextprime;

// Re-export commonly used types
pub use common::errors::{ClientError, Result};
pub use common::traits::MessageHandler;
pub use common::types::{Balances, Credentials, SubscriptionTarget, TradeRequest, TradeSide};
pub use config::types::AppConfig;
pub use nextprime::consumer::{DocumentPrinter, OutputSink};
pub use nextprime::reconnect::{run_with_reconnect, ReconnectPolicy};
pub use nextprime::rest::NextPrimeSession;
pub use nextprime::websocket::{StreamEnd, StreamState, StreamingSubscriber};
