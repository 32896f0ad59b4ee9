//! Signed REST collaborator
//!
//! The stream client needs exactly one REST capability: issue a signed request
//! and get JSON back. [`SignedRest`] is that seam; [`RestClient`] implements it
//! against the spot API with `reqwest`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::credentials::{timestamp_ms, Credentials};
use crate::error::{AuthError, AuthResult};

pub use reqwest::Method;

/// Spot REST base URL
pub const SPOT_REST_URL: &str = "https://api.mexc.com";

/// Default `recvWindow` sent with every signed request
const RECV_WINDOW_MS: u64 = 5000;

/// Capability to issue a signed REST request
#[async_trait]
pub trait SignedRest: Send + Sync {
    /// Send `params` to `path` with a signature appended, returning the JSON body
    async fn signed_request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> AuthResult<Value>;
}

/// Error body returned by the spot API
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

/// Builds the signed query string for `params`
///
/// `timestamp` and `recvWindow` are added, keys are sorted, values are
/// urlencoded with `%20` for spaces, and `&signature=<hex>` is appended.
pub(crate) fn signed_query(
    credentials: &Credentials,
    params: &[(&str, String)],
    timestamp: u64,
    recv_window: u64,
) -> AuthResult<String> {
    let mut pairs: Vec<(&str, String)> = params.to_vec();
    pairs.push(("timestamp", timestamp.to_string()));
    pairs.push(("recvWindow", recv_window.to_string()));
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let query = serde_urlencoded::to_string(&pairs)
        .map_err(|e| AuthError::Parse(e.to_string()))?
        .replace('+', "%20");

    let signature = credentials.sign(&query)?;
    Ok(format!("{}&signature={}", query, signature))
}

/// Spot REST client signing requests with [`Credentials`]
#[derive(Debug, Clone)]
pub struct RestClient {
    credentials: Credentials,
    client: Client,
    base_url: String,
    recv_window: u64,
}

impl RestClient {
    /// Create a client against the production spot API
    pub fn new(credentials: Credentials) -> AuthResult<Self> {
        Self::with_base_url(credentials, SPOT_REST_URL)
    }

    /// Create a client against a custom base URL
    pub fn with_base_url(credentials: Credentials, base_url: impl Into<String>) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("mexc-auth/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            credentials,
            client,
            base_url: base_url.into(),
            recv_window: RECV_WINDOW_MS,
        })
    }

    /// Override the `recvWindow` parameter
    pub fn with_recv_window(mut self, recv_window: Duration) -> Self {
        self.recv_window = recv_window.as_millis() as u64;
        self
    }

    /// Get the credentials used by this client
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

#[async_trait]
impl SignedRest for RestClient {
    #[instrument(skip(self, params))]
    async fn signed_request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> AuthResult<Value> {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        let query = signed_query(&self.credentials, params, timestamp_ms(), self.recv_window)?;
        let url = format!("{}{}?{}", self.base_url, path, query);

        debug!("Sending signed request");

        let response = self
            .client
            .request(method, &url)
            .header("X-MEXC-APIKEY", self.credentials.api_key())
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) => AuthError::Api {
                    code: err.code,
                    msg: err.msg,
                },
                Err(_) => AuthError::Api {
                    code: i64::from(status.as_u16()),
                    msg: body,
                },
            });
        }

        serde_json::from_str(&body).map_err(|e| AuthError::Parse(e.to_string()))
    }
}
