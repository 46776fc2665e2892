//! Authenticated REST session for the NextPrime API

use reqwest::{Client, Request, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::common::errors::{ClientError, Result};
use crate::common::types::{Balances, Credentials};

/// REST session scoped to one user.
///
/// Every request carries HTTP basic authentication. The underlying
/// `reqwest::Client` pools connections and is cheap to clone, so one
/// session can be shared between tasks.
#[derive(Debug, Clone)]
pub struct NextPrimeSession {
    /// HTTP client
    client: Client,
    /// Service endpoint, e.g. `https://test.npri.me`
    base_url: Url,
    /// Basic-auth credentials; `user` also scopes every path
    credentials: Credentials,
}

impl NextPrimeSession {
    /// Create a new session with the default 30 second request timeout
    pub fn new(endpoint: &str, credentials: Credentials) -> Result<Self> {
        Self::with_timeout(endpoint, credentials, Duration::from_secs(30))
    }

    /// Create a new session with custom timeout
    pub fn with_timeout(endpoint: &str, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        let base_url = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|e| ClientError::Configuration(format!("invalid endpoint {}: {}", endpoint, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Configuration(format!(
                "endpoint cannot be a base URL: {}",
                endpoint
            )));
        }

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    /// The authenticated user
    pub fn user(&self) -> &str {
        &self.credentials.user
    }

    /// Per-user resource prefix, `{endpoint}/{user}`
    pub fn prefix(&self) -> Url {
        self.url(&[])
    }

    // ========================================================================
    // Endpoints
    // ========================================================================

    /// Ping the server and return its reply text
    #[instrument(skip(self))]
    pub async fn ping(&self) -> Result<String> {
        let url = self.bare_url(&["ping"]);
        debug!("Pinging {}", url);

        let response = self.authed(self.client.get(url)).send().await?;
        let response = check_status(response).await?;
        Ok(response.text().await?)
    }

    /// All accounts visible to the authenticated user with their balances.
    ///
    /// Traders see one entry; exchanges see themselves plus all customers.
    /// An empty `currencies` slice means no filter.
    #[instrument(skip(self))]
    pub async fn get_all_balances(&self, currencies: &[&str]) -> Result<Balances> {
        let request = self.balances_request(None, currencies)?;
        debug!("Fetching balances from: {}", request.url());

        let response = self.client.execute(request).await?;
        read_json(check_status(response).await?).await
    }

    /// Balances for one account: the current user or, for an exchange,
    /// one of its customers
    #[instrument(skip(self))]
    pub async fn get_balance_for_user(&self, target_user: &str, currencies: &[&str]) -> Result<Balances> {
        let request = self.balances_request(Some(target_user), currencies)?;
        debug!("Fetching balances from: {}", request.url());

        let response = self.client.execute(request).await?;
        read_json(check_status(response).await?).await
    }

    /// Own balances, via `get_balance_for_user`
    pub async fn get_my_balance(&self, currencies: &[&str]) -> Result<Balances> {
        self.get_balance_for_user(&self.credentials.user, currencies)
            .await
    }

    /// Submit a trade.
    ///
    /// With `show_balances` unset any success response yields `None`,
    /// whatever its body. With it set the server must answer with a JSON
    /// body; a 204 is a protocol error.
    #[instrument(skip(self, trade))]
    pub async fn post_trade<T>(&self, trade: &T, show_balances: bool) -> Result<Option<Balances>>
    where
        T: Serialize + ?Sized,
    {
        let url = self.url(&["trades", "new"]);
        let mut builder = self.authed(self.client.post(url)).json(trade);
        if show_balances {
            builder = builder.query(&[("show_balances", "yes")]);
        }

        let response = builder.send().await?;
        let response = check_status(response).await?;

        if !show_balances {
            return Ok(None);
        }

        let status = response.status();
        let body = if status == StatusCode::NO_CONTENT {
            String::new()
        } else {
            response.text().await?
        };
        if body.trim().is_empty() {
            return Err(ClientError::Protocol(
                "Empty message body when JSON expected".to_string(),
            ));
        }
        parse_json(status.as_u16(), &body).map(Some)
    }

    // ========================================================================
    // Helper Methods
    // ========================================================================

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.credentials.user, Some(&self.credentials.api_key))
    }

    /// `{endpoint}/{segments...}`, each segment percent-encoded
    fn bare_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `{endpoint}/{user}/{segments...}`
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.bare_url(&[self.credentials.user.as_str()]);
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    /// GET `{prefix}/balances[/{target}]`, with one `ccy` pair per currency
    fn balances_request(&self, target_user: Option<&str>, currencies: &[&str]) -> Result<Request> {
        let url = match target_user {
            Some(target) => self.url(&["balances", target]),
            None => self.url(&["balances"]),
        };

        let mut builder = self.authed(self.client.get(url));
        if !currencies.is_empty() {
            let params: Vec<(&str, &str)> = currencies.iter().map(|c| ("ccy", *c)).collect();
            builder = builder.query(&params);
        }
        Ok(builder.build()?)
    }
}

/// Turn a non-2xx response into `ClientError::Transport`
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Transport {
        status: status.as_u16(),
        message: body,
    })
}

async fn read_json(response: Response) -> Result<Balances> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    parse_json(status, &body)
}

fn parse_json(status: u16, body: &str) -> Result<Balances> {
    serde_json::from_str(body).map_err(|e| ClientError::Transport {
        status,
        message: format!("malformed JSON body: {}", e),
    })
}
