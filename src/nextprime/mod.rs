//! NextPrime module - REST session and balance stream subscriber

pub mod consumer;
pub mod reconnect;
pub mod rest;
pub mod websocket;

pub use consumer::{DocumentPrinter, OutputSink};
pub use reconnect::{run_with_reconnect, ReconnectPolicy};
pub use rest::NextPrimeSession;
pub use websocket::{StreamEnd, StreamState, StreamingSubscriber};
