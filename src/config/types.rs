//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::common::errors::{ClientError, Result};
use crate::common::types::{Credentials, SubscriptionTarget};
use crate::nextprime::reconnect::ReconnectPolicy;
use crate::nextprime::rest::NextPrimeSession;
use crate::nextprime::websocket::StreamingSubscriber;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// NextPrime connection configuration
    #[serde(default)]
    pub nextprime: NextPrimeConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// NextPrime account and endpoint configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct NextPrimeConfig {
    /// Username used for basic authentication
    #[serde(default)]
    pub user: Option<String>,
    /// API key used for basic authentication
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL for the REST API
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Base URL for the streaming API (scheme and host)
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    /// Venue identifier stamped on submitted trades
    #[serde(default)]
    pub venue: Option<String>,
    /// Account to observe in the balance stream; defaults to `user`
    #[serde(default)]
    pub actor: Option<String>,
    /// File receiving streamed messages; stdout when unset
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}

impl std::fmt::Debug for NextPrimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextPrimeConfig")
            .field("user", &self.user)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("stream_url", &self.stream_url)
            .field("venue", &self.venue)
            .field("actor", &self.actor)
            .field("output_path", &self.output_path)
            .finish()
    }
}

impl Default for NextPrimeConfig {
    fn default() -> Self {
        Self {
            user: None,
            api_key: None,
            endpoint: default_endpoint(),
            stream_url: default_stream_url(),
            venue: None,
            actor: None,
            output_path: None,
        }
    }
}

fn default_endpoint() -> String {
    "https://test.npri.me".to_string()
}

fn default_stream_url() -> String {
    "wss://test.npri.me".to_string()
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// WebSocket connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Maximum silence on the stream in seconds (0 = wait forever)
    #[serde(default)]
    pub idle_timeout_seconds: u64,
    /// Initial delay between reconnection attempts in milliseconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Upper bound for the reconnection backoff in milliseconds
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_ms: u64,
    /// Maximum reconnection attempts (0 = infinite)
    #[serde(default)]
    pub max_reconnect_attempts: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            request_timeout_seconds: default_request_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: 0,
            reconnect_delay_ms: default_reconnect_delay(),
            max_reconnect_delay_ms: default_max_reconnect_delay(),
            max_reconnect_attempts: 0,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    1000
}

fn default_max_reconnect_delay() -> u64 {
    30_000
}

impl AppSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_seconds > 0).then(|| Duration::from_secs(self.connect_timeout_seconds))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_seconds > 0).then(|| Duration::from_secs(self.idle_timeout_seconds))
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_delay: Duration::from_millis(self.max_reconnect_delay_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

impl AppConfig {
    /// Credentials from configuration; both user and api key are required
    pub fn credentials(&self) -> Result<Credentials> {
        let user = self
            .nextprime
            .user
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ClientError::Configuration("missing user".to_string()))?;
        let api_key = self
            .nextprime
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ClientError::Configuration("missing api key".to_string()))?;
        Ok(Credentials::new(user, api_key))
    }

    /// Build a new REST session from the current configuration
    pub fn session(&self) -> Result<NextPrimeSession> {
        NextPrimeSession::with_timeout(
            &self.nextprime.endpoint,
            self.credentials()?,
            self.settings.request_timeout(),
        )
    }

    /// Build a streaming subscriber; `actor` overrides the configured actor
    pub fn subscriber(&self, actor: Option<&str>) -> Result<StreamingSubscriber> {
        let credentials = self.credentials()?;
        let actor = actor.or(self.nextprime.actor.as_deref());
        let target = SubscriptionTarget::new(actor, credentials.user.clone());

        Ok(
            StreamingSubscriber::new(&self.nextprime.stream_url, target, credentials)
                .with_connect_timeout(self.settings.connect_timeout())
                .with_idle_timeout(self.settings.idle_timeout()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> AppConfig {
        let mut config = AppConfig::default();
        config.nextprime.user = Some("alice".to_string());
        config.nextprime.api_key = Some("key".to_string());
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.nextprime.endpoint, "https://test.npri.me");
        assert_eq!(config.nextprime.stream_url, "wss://test.npri.me");
        assert_eq!(config.settings.idle_timeout(), None);
        assert_eq!(config.settings.connect_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_missing_credentials_is_configuration_error() {
        let config = AppConfig::default();
        assert!(matches!(
            config.credentials(),
            Err(ClientError::Configuration(_))
        ));
        assert!(config.session().is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let shown = format!("{:?}", configured().nextprime);
        assert!(shown.contains("alice"));
        assert!(!shown.contains("\"key\""));
    }

    #[test]
    fn test_subscriber_actor_resolution() {
        let mut config = configured();
        let sub = config.subscriber(None).unwrap();
        assert_eq!(sub.target().actor, "alice");

        config.nextprime.actor = Some("exchange".to_string());
        let sub = config.subscriber(None).unwrap();
        assert_eq!(sub.target().actor, "exchange");

        let sub = config.subscriber(Some("bob")).unwrap();
        assert_eq!(sub.target().actor, "bob");
        assert_eq!(sub.target().user, "alice");
    }
}
