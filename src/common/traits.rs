//! Trait definitions for stream consumers

use async_trait::async_trait;

use super::errors::Result;

/// Handler for inbound balance/trade stream messages.
///
/// The subscriber awaits `consume` for each frame before reading the next
/// one, so an implementation never sees two messages at once.
///
/// # Example
///
/// ```ignore
/// struct Collector(Vec<serde_json::Value>);
///
/// #[async_trait]
/// impl MessageHandler for Collector {
///     async fn consume(&mut self, message: &str) -> Result<()> {
///         self.0.push(serde_json::from_str(message)?);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send {
    /// Process one message, given as the raw JSON text of the frame.
    ///
    /// Returning an error ends the current `run`.
    async fn consume(&mut self, message: &str) -> Result<()>;
}

#[async_trait]
impl<H: MessageHandler + ?Sized> MessageHandler for Box<H> {
    async fn consume(&mut self, message: &str) -> Result<()> {
        (**self).consume(message).await
    }
}
