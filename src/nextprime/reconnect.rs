//! Reconnect-with-backoff supervision around a [`StreamingSubscriber`]

use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use super::websocket::{StreamEnd, StreamingSubscriber};
use crate::common::errors::{ClientError, Result};
use crate::common::traits::MessageHandler;

/// Exponential backoff between reconnection attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap for the doubled delay
    pub max_delay: Duration,
    /// Consecutive failed attempts allowed (0 = infinite)
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 0,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt > self.max_attempts
    }
}

/// Errors worth another connection attempt
fn is_retryable(err: &ClientError) -> bool {
    matches!(
        err,
        ClientError::WebSocketConnection(_)
            | ClientError::WebSocketCommunication(_)
            | ClientError::Timeout(_)
    )
}

/// Keep `subscriber` streaming into `handler` until `shutdown` completes.
///
/// Dropped connections and transient failures are retried with backoff.
/// Handshake rejections, handler errors and malformed messages are
/// returned immediately. The attempt counter resets only after a
/// connection has delivered at least one message, so a server that
/// accepts and closes straight away still exhausts the policy.
pub async fn run_with_reconnect<H, F>(
    subscriber: &mut StreamingSubscriber,
    handler: &mut H,
    policy: &ReconnectPolicy,
    shutdown: F,
) -> Result<()>
where
    H: MessageHandler + ?Sized,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut attempt: u32 = 0;

    loop {
        let outcome = match subscriber.subscribe().await {
            Ok(()) => subscriber.run_until(handler, &mut shutdown).await,
            Err(e) => Err(e),
        };

        if subscriber.delivered() > 0 {
            attempt = 0;
        }

        match outcome {
            Ok(StreamEnd::Shutdown) => return Ok(()),
            Ok(StreamEnd::Closed) => info!("Stream closed by server, reconnecting"),
            Err(e) if is_retryable(&e) => warn!("Stream interrupted: {}", e),
            Err(e) => return Err(e),
        }

        attempt += 1;
        if policy.exhausted(attempt) {
            return Err(ClientError::WebSocketConnection(format!(
                "giving up after {} reconnection attempts",
                policy.max_attempts
            )));
        }

        let delay = policy.delay_for(attempt);
        info!("Reconnection attempt {} in {:?}", attempt, delay);
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            max_attempts: 0,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(64), Duration::from_millis(500));
    }

    #[test]
    fn test_exhaustion() {
        let unlimited = ReconnectPolicy::default();
        assert!(!unlimited.exhausted(1_000));

        let limited = ReconnectPolicy {
            max_attempts: 2,
            ..ReconnectPolicy::default()
        };
        assert!(!limited.exhausted(2));
        assert!(limited.exhausted(3));
    }

    #[test]
    fn test_handshake_is_not_retryable() {
        assert!(!is_retryable(&ClientError::Handshake { status: 401 }));
        assert!(is_retryable(&ClientError::Timeout("idle".to_string())));
    }
}
