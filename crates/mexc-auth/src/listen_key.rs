//! Listen key lifecycle for private spot streams
//!
//! A listen key authorizes the private spot WebSocket and is embedded in the
//! connection URL. It expires after an hour unless renewed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{AuthError, AuthResult};
use crate::rest::{Method, SignedRest};

/// Validity of a freshly issued or renewed listen key
pub const LISTEN_KEY_TTL: Duration = Duration::from_secs(60 * 60);

const USER_DATA_STREAM_PATH: &str = "/api/v3/userDataStream";

/// Listen key for private spot channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenKey {
    /// The token embedded as `?listenKey=<token>`
    pub token: String,
    /// When the token was issued or last renewed
    pub issued_at: DateTime<Utc>,
    /// How long the token stays valid after `issued_at`
    pub ttl: Duration,
}

impl ListenKey {
    /// Wrap a token issued now
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            issued_at: Utc::now(),
            ttl: LISTEN_KEY_TTL,
        }
    }

    /// Returns true if the key is past its TTL at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => now >= self.issued_at + ttl,
            Err(_) => false,
        }
    }

    /// Returns true if the key is past its TTL
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListenKeyResponse {
    listen_key: String,
}

/// Issues, renews, and closes listen keys
#[async_trait]
pub trait ListenKeyProvider: Send + Sync {
    /// Issue a new listen key
    async fn create_listen_key(&self) -> AuthResult<ListenKey>;

    /// Extend the validity of `key`
    async fn renew_listen_key(&self, key: &str) -> AuthResult<()>;

    /// Invalidate `key`
    async fn close_listen_key(&self, key: &str) -> AuthResult<()>;
}

/// [`ListenKeyProvider`] backed by the `/api/v3/userDataStream` endpoints
#[derive(Debug, Clone)]
pub struct RestListenKeyProvider<R> {
    rest: R,
}

impl<R: SignedRest> RestListenKeyProvider<R> {
    /// Create a provider issuing requests through `rest`
    pub fn new(rest: R) -> Self {
        Self { rest }
    }

    /// Get the underlying REST collaborator
    pub fn rest(&self) -> &R {
        &self.rest
    }
}

#[async_trait]
impl<R: SignedRest> ListenKeyProvider for RestListenKeyProvider<R> {
    #[instrument(skip(self))]
    async fn create_listen_key(&self) -> AuthResult<ListenKey> {
        let body = self
            .rest
            .signed_request(Method::POST, USER_DATA_STREAM_PATH, &[])
            .await?;

        let response: ListenKeyResponse =
            serde_json::from_value(body).map_err(|e| AuthError::Parse(e.to_string()))?;

        info!("Created listen key");
        Ok(ListenKey::new(response.listen_key))
    }

    #[instrument(skip(self, key))]
    async fn renew_listen_key(&self, key: &str) -> AuthResult<()> {
        let body = self
            .rest
            .signed_request(
                Method::PUT,
                USER_DATA_STREAM_PATH,
                &[("listenKey", key.to_string())],
            )
            .await?;
        debug!(response = %body, "Renewed listen key");
        Ok(())
    }

    #[instrument(skip(self, key))]
    async fn close_listen_key(&self, key: &str) -> AuthResult<()> {
        self.rest
            .signed_request(
                Method::DELETE,
                USER_DATA_STREAM_PATH,
                &[("listenKey", key.to_string())],
            )
            .await?;
        info!("Closed listen key");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    #[derive(Default)]
    struct RecordingRest {
        calls: Mutex<Vec<(Method, String, Vec<(String, String)>)>>,
    }

    #[async_trait]
    impl SignedRest for RecordingRest {
        async fn signed_request(
            &self,
            method: Method,
            path: &str,
            params: &[(&str, String)],
        ) -> AuthResult<Value> {
            self.calls.lock().push((
                method,
                path.to_string(),
                params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            ));
            Ok(json!({"listenKey": "pqia91ma19a5s61cv6a81va65sdf19v8a65a1a5s61cv6a81va65sdf19v8a65a1"}))
        }
    }

    #[tokio::test]
    async fn test_create_listen_key() {
        let provider = RestListenKeyProvider::new(RecordingRest::default());
        let key = provider.create_listen_key().await.unwrap();

        assert!(key.token.starts_with("pqia91"));
        assert_eq!(key.ttl, LISTEN_KEY_TTL);
        assert!(!key.is_expired());

        let calls = provider.rest().calls.lock();
        assert_eq!(calls[0].0, Method::POST);
        assert_eq!(calls[0].1, "/api/v3/userDataStream");
        assert!(calls[0].2.is_empty());
    }

    #[tokio::test]
    async fn test_renew_and_close_pass_key() {
        let provider = RestListenKeyProvider::new(RecordingRest::default());
        provider.renew_listen_key("abc").await.unwrap();
        provider.close_listen_key("abc").await.unwrap();

        let calls = provider.rest().calls.lock();
        assert_eq!(calls[0].0, Method::PUT);
        assert_eq!(calls[1].0, Method::DELETE);
        for call in calls.iter() {
            assert_eq!(call.2, vec![("listenKey".to_string(), "abc".to_string())]);
        }
    }

    #[test]
    fn test_expiry() {
        let key = ListenKey::new("abc");
        assert!(!key.is_expired_at(key.issued_at + chrono::Duration::minutes(59)));
        assert!(key.is_expired_at(key.issued_at + chrono::Duration::minutes(60)));
    }
}
