//! Error types for the MEXC stream SDK

use std::time::Duration;
use thiserror::Error;

/// Main error type for stream client operations
#[derive(Error, Debug)]
pub enum MexcError {
    // === Connection Errors ===
    /// Failed to establish WebSocket connection
    #[error("Failed to connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Connection attempt timed out
    #[error("Connection timeout after {timeout:?} to {url}")]
    ConnectionTimeout { url: String, timeout: Duration },

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Retry budget exhausted, the client will not reconnect
    #[error("Connection failed after {attempts} attempts: {last_error}")]
    ReconnectExhausted { attempts: u32, last_error: String },

    // === Protocol Errors ===
    /// Failed to parse JSON message
    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String, raw: Option<String> },

    /// Frame could not be decoded into a message
    #[error("Decode error: {0}")]
    Decode(String),

    // === Subscription Errors ===
    /// Topic is already registered on this client
    #[error("Already subscribed to topic: {topic}")]
    DuplicateSubscription { topic: String },

    /// Topic is not registered on this client
    #[error("Not subscribed to topic: {topic}")]
    UnknownTopic { topic: String },

    /// Topic parameters are malformed
    #[error("Invalid topic {topic}: {reason}")]
    InvalidTopic { topic: String, reason: String },

    /// Per-connection topic limit reached
    #[error("Subscription limit of {limit} topics reached")]
    SubscriptionLimit { limit: usize },

    /// Subscription was rejected by server
    #[error("Subscription rejected for {topic}: {reason}")]
    SubscriptionRejected { topic: String, reason: String },

    // === Authentication Errors ===
    /// Authentication failed
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    /// Private topic requested on a client without credentials
    #[error("Private topic {topic} requires credentials")]
    AuthRequired { topic: String },

    /// The listen key / credential service failed
    #[error("Credential error: {0}")]
    Credential(String),

    // === Internal Errors ===
    /// Client is shutting down or closed
    #[error("Shutdown in progress")]
    ShuttingDown,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MexcError {
    /// Returns true if this error is potentially recoverable via retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::ConnectionTimeout { .. } | Self::WebSocket(_)
        )
    }

    /// Returns true if this error indicates a bug in the calling code
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateSubscription { .. }
                | Self::UnknownTopic { .. }
                | Self::InvalidTopic { .. }
                | Self::SubscriptionLimit { .. }
                | Self::AuthRequired { .. }
        )
    }

    /// Returns true if this error requires reconnection
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, Self::WebSocket(_) | Self::ConnectionFailed { .. })
    }

    /// Returns true if the client can no longer be used
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ReconnectExhausted { .. } | Self::ShuttingDown | Self::Configuration(_)
        )
    }

    /// Create an invalid topic error
    pub fn invalid_topic(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTopic {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    /// Create a subscription rejected error
    pub fn subscription_rejected(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SubscriptionRejected {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for MexcError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson {
            message: err.to_string(),
            raw: None,
        }
    }
}

/// Result type alias for stream client operations
pub type MexcResult<T> = Result<T, MexcError>;
