//! Client Builder Pattern
//!
//! One fluent builder for both product lines. It validates the connection
//! settings, optionally loads credentials from the environment, and wires
//! the right authorization for each protocol: a REST listen key provider
//! for spot, the login frame for futures.
//!
//! # Example
//!
//! ```
//! use mexc_sdk::MexcClientBuilder;
//! use std::time::Duration;
//!
//! let builder = MexcClientBuilder::new()
//!     .with_retries(5)
//!     .with_ping_interval(Duration::from_secs(15));
//! assert!(builder.validate().is_ok());
//! ```

use mexc_auth::{AuthError, Credentials, RestClient, RestListenKeyProvider};
use mexc_types::MexcError;
use mexc_ws::{
    ConnectionConfig, FuturesClient, FuturesProtocol, Hooks, ReconnectConfig, SpotClient,
    SpotProtocol, StreamClientBuilder,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Ping interval of zero
    #[error("ping interval must be greater than zero")]
    PingIntervalZero,

    /// Listen key renewal interval of zero
    #[error("listen key renewal interval must be greater than zero")]
    RenewIntervalZero,

    /// Timeout too short
    #[error("connection timeout must be at least 1 second")]
    TimeoutTooShort,

    /// Credentials could not be loaded
    #[error("credentials: {0}")]
    Credentials(#[from] AuthError),
}

impl From<ConfigError> for MexcError {
    fn from(err: ConfigError) -> Self {
        MexcError::Configuration(err.to_string())
    }
}

/// Builder for spot and futures stream clients
#[derive(Debug, Clone, Default)]
pub struct MexcClientBuilder {
    /// Connection settings handed to the engine
    pub config: ConnectionConfig,

    /// Explicit API key pair
    pub credentials: Option<Credentials>,

    /// Read `MEXC_API_KEY` / `MEXC_API_SECRET` when no key pair was given
    pub env_credentials: bool,

    /// Spot REST base URL override for listen key requests
    pub rest_url: Option<String>,

    /// Subscribe spot channels in protobuf mode
    pub protobuf: bool,

    /// Observability callbacks
    pub hooks: Hooks,
}

impl MexcClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with credentials taken from the environment at build time
    pub fn from_env() -> Self {
        Self::new().with_env_credentials()
    }

    /// Override the WebSocket URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.config = self.config.with_url(url);
        self
    }

    pub fn with_reconnect(mut self, config: ReconnectConfig) -> Self {
        self.config = self.config.with_reconnect(config);
        self
    }

    /// Failed connect attempts allowed (0 = unlimited)
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.config = self.config.with_retries(retries);
        self
    }

    pub fn without_reconnect(mut self) -> Self {
        self.config = self.config.without_reconnect();
        self
    }

    /// Bound on each handshake
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_ping_interval(interval);
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_auth_timeout(timeout);
        self
    }

    pub fn with_renew_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_renew_interval(interval);
        self
    }

    /// Stay closed after a ready session fails
    pub fn without_restart(mut self) -> Self {
        self.config = self.config.without_restart();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_env_credentials(mut self) -> Self {
        self.env_credentials = true;
        self
    }

    /// Spot REST base URL for listen key requests
    pub fn with_rest_url(mut self, url: impl Into<String>) -> Self {
        self.rest_url = Some(url.into());
        self
    }

    /// Spot channels with the `.pb` suffix; pair with a protobuf decoder
    pub fn with_protobuf(mut self, protobuf: bool) -> Self {
        self.protobuf = protobuf;
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Check the connection settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.config.ping_interval.is_zero() {
            return Err(ConfigError::PingIntervalZero);
        }
        if self.config.renew_interval.is_zero() {
            return Err(ConfigError::RenewIntervalZero);
        }
        if self.config.connect_timeout < Duration::from_secs(1) {
            return Err(ConfigError::TimeoutTooShort);
        }
        Ok(())
    }

    fn resolve_credentials(&self) -> Result<Option<Credentials>, ConfigError> {
        match (&self.credentials, self.env_credentials) {
            (Some(credentials), _) => Ok(Some(credentials.clone())),
            (None, true) => Ok(Some(Credentials::from_env()?)),
            (None, false) => Ok(None),
        }
    }

    /// Engine builder for spot, with listen key provisioning when credentials are set
    pub fn spot_builder(&self) -> Result<StreamClientBuilder<SpotProtocol>, ConfigError> {
        self.validate()?;
        let protocol = if self.protobuf {
            SpotProtocol::protobuf()
        } else {
            SpotProtocol::json()
        };

        let mut builder = SpotClient::builder(protocol)
            .with_config(self.config.clone())
            .with_hooks(self.hooks.clone());

        if let Some(credentials) = self.resolve_credentials()? {
            let rest = match &self.rest_url {
                Some(url) => RestClient::with_base_url(credentials, url.clone())?,
                None => RestClient::new(credentials)?,
            };
            debug!("spot client with listen key provider");
            builder = builder.with_listen_key_provider(Arc::new(RestListenKeyProvider::new(rest)));
        }
        Ok(builder)
    }

    /// Engine builder for futures, logging in when credentials are set
    pub fn futures_builder(&self) -> Result<StreamClientBuilder<FuturesProtocol>, ConfigError> {
        self.validate()?;
        let mut builder = FuturesClient::builder(FuturesProtocol)
            .with_config(self.config.clone())
            .with_hooks(self.hooks.clone());

        if let Some(credentials) = self.resolve_credentials()? {
            debug!("futures client with login credentials");
            builder = builder.with_credentials(credentials);
        }
        Ok(builder)
    }

    pub fn build_spot(&self) -> Result<SpotClient, ConfigError> {
        Ok(self.spot_builder()?.build())
    }

    pub fn build_futures(&self) -> Result<FuturesClient, ConfigError> {
        Ok(self.futures_builder()?.build())
    }

    /// Build a spot client and wait for its first ready session
    pub async fn connect_spot(&self) -> Result<SpotClient, MexcError> {
        let client = self.build_spot()?;
        client.connect().await?;
        Ok(client)
    }

    /// Build a futures client and wait for its first ready session
    pub async fn connect_futures(&self) -> Result<FuturesClient, MexcError> {
        let client = self.build_futures()?;
        client.connect().await?;
        Ok(client)
    }
}
