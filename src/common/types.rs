//! Shared types used by the REST session and the streaming subscriber

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Balances keyed by account, each a currency -> {balance, available} object.
///
/// The venue owns this structure; the client passes it through untouched.
pub type Balances = serde_json::Map<String, serde_json::Value>;

/// API credentials used for HTTP basic authentication
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub api_key: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            api_key: api_key.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Whose balance stream to observe, and as whom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionTarget {
    /// The account being observed
    pub actor: String,
    /// The authenticating user
    pub user: String,
}

impl SubscriptionTarget {
    /// Build a target; `actor` defaults to `user`
    pub fn new(actor: Option<&str>, user: impl Into<String>) -> Self {
        let user = user.into();
        Self {
            actor: actor.map(str::to_string).unwrap_or_else(|| user.clone()),
            user,
        }
    }
}

/// Trade side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for TradeSide {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            other => Err(format!("unknown trade side: {}", other)),
        }
    }
}

/// A trade report submitted to `/{user}/trades/new`.
///
/// Only the server validates these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub trader: String,
    pub venue: String,
    pub txid: String,
    pub side: TradeSide,
    pub symbol: String,
    pub price: Decimal,
    pub size: Decimal,
    #[serde(with = "tradetime_format")]
    pub tradetime: NaiveDateTime,
    pub cost: Decimal,
    pub cost_ccy: String,
    pub fees: Decimal,
    pub fees_ccy: String,
}

impl TradeRequest {
    /// Fresh random transaction id
    pub fn new_txid() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// `YYYYMMDD-HH:MM:SS.mmm`, the venue's timestamp format
pub mod tradetime_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y%m%d-%H:%M:%S%.3f";

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn sample_trade() -> TradeRequest {
        TradeRequest {
            trader: "alice".to_string(),
            venue: "venue".to_string(),
            txid: "tx-1".to_string(),
            side: TradeSide::Sell,
            symbol: "BTCUSD".to_string(),
            price: dec!(17.47),
            size: dec!(100),
            tradetime: NaiveDate::from_ymd_opt(2019, 8, 7)
                .unwrap()
                .and_hms_milli_opt(20, 3, 22, 243)
                .unwrap(),
            cost: dec!(1747.00),
            cost_ccy: "USD".to_string(),
            fees: dec!(0.01),
            fees_ccy: "USD".to_string(),
        }
    }

    #[test]
    fn test_actor_defaults_to_user() {
        let target = SubscriptionTarget::new(None, "alice");
        assert_eq!(target.actor, "alice");

        let target = SubscriptionTarget::new(Some("exchange"), "alice");
        assert_eq!(target.actor, "exchange");
        assert_eq!(target.user, "alice");
    }

    #[test]
    fn test_credentials_debug_redacts_key() {
        let creds = Credentials::new("alice", "s3cret");
        let shown = format!("{:?}", creds);
        assert!(shown.contains("alice"));
        assert!(!shown.contains("s3cret"));
    }

    #[test]
    fn test_trade_wire_format() {
        let value = serde_json::to_value(sample_trade()).unwrap();
        assert_eq!(value["side"], "SELL");
        assert_eq!(value["price"], "17.47");
        assert_eq!(value["cost"], "1747.00");
        assert_eq!(value["tradetime"], "20190807-20:03:22.243");
    }

    #[test]
    fn test_trade_side_parsing() {
        assert_eq!("buy".parse::<TradeSide>().unwrap(), TradeSide::Buy);
        assert_eq!("SELL".parse::<TradeSide>().unwrap(), TradeSide::Sell);
        assert!("hold".parse::<TradeSide>().is_err());
    }

    #[test]
    fn test_new_txid_is_unique() {
        assert_ne!(TradeRequest::new_txid(), TradeRequest::new_txid());
    }
}
