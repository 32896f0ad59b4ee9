//! Observability hooks for connection lifecycle monitoring
//!
//! Hooks observe the engine without touching topic callbacks: connects,
//! disconnects, retry attempts, subscription acks and rejections, raw
//! message sizes, and errors.
//!
//! # Example
//!
//! ```
//! use mexc_ws::hooks::Hooks;
//!
//! let hooks = Hooks::new()
//!     .on_connect(|info| {
//!         println!("Connected to {} (session {})", info.url, info.session);
//!     })
//!     .on_subscription(|info| {
//!         if !info.accepted {
//!             eprintln!("{} rejected: {:?}", info.key, info.reason);
//!         }
//!     })
//!     .on_reconnect_attempt(|attempt, delay| {
//!         println!("Reconnecting (attempt {}), waiting {:?}", attempt, delay);
//!     });
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Information about a session that became ready
#[derive(Debug, Clone)]
pub struct ConnectInfo {
    /// Endpoint with any listen key redacted
    pub url: String,
    /// Whether an earlier session existed
    pub is_reconnection: bool,
    /// Session counter, starting at 1
    pub session: u64,
}

/// Reason a ready session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectInfo {
    /// Server closed the connection
    ServerClosed,
    /// Receive or send error
    NetworkError(String),
    /// Sending the application ping failed
    PingFailed(String),
    /// Client requested shutdown
    Shutdown,
}

/// Subscription ack or rejection
#[derive(Debug, Clone)]
pub struct SubscriptionInfo {
    /// Registry key
    pub key: String,
    /// Whether the server accepted the subscription
    pub accepted: bool,
    /// Rejection reason (if any)
    pub reason: Option<String>,
}

pub type ConnectHook = Arc<dyn Fn(&ConnectInfo) + Send + Sync>;
pub type DisconnectHook = Arc<dyn Fn(&DisconnectInfo) + Send + Sync>;
pub type ReconnectAttemptHook = Arc<dyn Fn(u32, Duration) + Send + Sync>;
pub type SubscriptionHook = Arc<dyn Fn(&SubscriptionInfo) + Send + Sync>;
pub type MessageHook = Arc<dyn Fn(usize) + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Observability hooks container
///
/// All hooks are optional and run synchronously on the engine's tasks.
/// Keep them fast; a slow hook delays the frames behind it.
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) on_connect: Option<ConnectHook>,
    pub(crate) on_disconnect: Option<DisconnectHook>,
    pub(crate) on_reconnect_attempt: Option<ReconnectAttemptHook>,
    pub(crate) on_subscription: Option<SubscriptionHook>,
    pub(crate) on_message: Option<MessageHook>,
    pub(crate) on_error: Option<ErrorHook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_connect", &self.on_connect.as_ref().map(|_| "..."))
            .field("on_disconnect", &self.on_disconnect.as_ref().map(|_| "..."))
            .field("on_reconnect_attempt", &self.on_reconnect_attempt.as_ref().map(|_| "..."))
            .field("on_subscription", &self.on_subscription.as_ref().map(|_| "..."))
            .field("on_message", &self.on_message.as_ref().map(|_| "..."))
            .field("on_error", &self.on_error.as_ref().map(|_| "..."))
            .finish()
    }
}

impl Hooks {
    /// Create a new empty hooks container
    pub fn new() -> Self {
        Self::default()
    }

    /// Called each time a session becomes ready, including reconnections
    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: Fn(&ConnectInfo) + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Called when a ready session ends
    pub fn on_disconnect<F>(mut self, f: F) -> Self
    where
        F: Fn(&DisconnectInfo) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Called after a failed connect attempt with the failure count and the
    /// delay before the next attempt
    pub fn on_reconnect_attempt<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.on_reconnect_attempt = Some(Arc::new(f));
        self
    }

    /// Called when the server confirms or rejects a subscription
    pub fn on_subscription<F>(mut self, f: F) -> Self
    where
        F: Fn(&SubscriptionInfo) + Send + Sync + 'static,
    {
        self.on_subscription = Some(Arc::new(f));
        self
    }

    /// Called on each inbound frame with its size in bytes
    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(f));
        self
    }

    /// Called on errors with the error message
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn invoke_connect(&self, info: &ConnectInfo) {
        if let Some(ref hook) = self.on_connect {
            hook(info);
        }
    }

    pub(crate) fn invoke_disconnect(&self, info: &DisconnectInfo) {
        if let Some(ref hook) = self.on_disconnect {
            hook(info);
        }
    }

    pub(crate) fn invoke_reconnect_attempt(&self, attempt: u32, delay: Duration) {
        if let Some(ref hook) = self.on_reconnect_attempt {
            hook(attempt, delay);
        }
    }

    pub(crate) fn invoke_subscription(&self, info: &SubscriptionInfo) {
        if let Some(ref hook) = self.on_subscription {
            hook(info);
        }
    }

    pub(crate) fn invoke_message(&self, size: usize) {
        if let Some(ref hook) = self.on_message {
            hook(size);
        }
    }

    pub(crate) fn invoke_error(&self, msg: &str) {
        if let Some(ref hook) = self.on_error {
            hook(msg);
        }
    }
}
