//! Connection supervisor
//!
//! One supervisor task per client owns the reconnect loop. Each ready session
//! gets a fresh outbound queue installed atomically with a registry snapshot,
//! so every registered topic is sent exactly once per session and before any
//! later application traffic.

use crate::codec::FrameDecoder;
use crate::endpoint::{redact, with_listen_key};
use crate::hooks::{ConnectInfo, DisconnectInfo, Hooks};
use crate::keepalive;
use crate::protocol::{AuthMode, Protocol};
use crate::reconnect::ReconnectConfig;
use crate::router::{self, Routed};
use crate::subscription::Registry;
use crate::transport::{Connector, Transport};

use ::futures::FutureExt;
use mexc_auth::{timestamp_ms, Credentials, ListenKey, ListenKeyProvider};
use mexc_types::{MexcError, MexcResult};
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Connection state published by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected
    Disconnected,
    /// Transport handshake in progress
    Connecting,
    /// Login frame sent, waiting for the ack
    Authenticating,
    /// Session live, subscriptions replayed
    Ready,
    /// Waiting before the next attempt
    Reconnecting,
    /// Terminal
    Closed,
}

impl ConnectionState {
    /// Returns true once the client can no longer reconnect
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

/// Configuration for the stream connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Endpoint override; `None` uses the protocol's default URL
    pub url: Option<String>,
    /// Reconnection settings
    pub reconnect: ReconnectConfig,
    /// Bound on each transport handshake
    pub connect_timeout: Duration,
    /// Application ping period
    pub ping_interval: Duration,
    /// How long to wait for a login ack
    pub auth_timeout: Duration,
    /// Listen key renewal period
    pub renew_interval: Duration,
    /// Reconnect after a ready session fails
    pub restart_on_error: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: None,
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(20),
            auth_timeout: Duration::from_secs(10),
            renew_interval: Duration::from_secs(59 * 60),
            restart_on_error: true,
        }
    }
}

impl ConnectionConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the endpoint URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set reconnection config
    pub fn with_reconnect(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = config;
        self
    }

    /// Set the retry budget (0 = unlimited)
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.reconnect.retries = retries;
        self
    }

    /// Give up after the first failed attempt
    pub fn without_reconnect(mut self) -> Self {
        self.reconnect = ReconnectConfig::disabled();
        self
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set ping period
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set login ack timeout
    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Set listen key renewal period
    pub fn with_renew_interval(mut self, interval: Duration) -> Self {
        self.renew_interval = interval;
        self
    }

    /// Close instead of reconnecting when a ready session fails
    pub fn without_restart(mut self) -> Self {
        self.restart_on_error = false;
        self
    }

    /// Reject settings the keep-alive timers cannot run with
    pub fn validate(&self) -> MexcResult<()> {
        if self.ping_interval.is_zero() {
            return Err(MexcError::Configuration(
                "ping interval must be greater than zero".to_string(),
            ));
        }
        if self.renew_interval.is_zero() {
            return Err(MexcError::Configuration(
                "listen key renewal interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// State guarded by the registry mutex
pub(crate) struct Inner<T> {
    pub(crate) registry: Registry<T>,
    /// Queue of the live session; `None` between sessions
    pub(crate) outbound: Option<mpsc::UnboundedSender<String>>,
}

/// State shared between a client and its tasks
pub(crate) struct Shared<P: Protocol> {
    pub(crate) config: ConnectionConfig,
    pub(crate) protocol: P,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) decoder: Arc<dyn FrameDecoder>,
    pub(crate) hooks: Hooks,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) listen_keys: Option<Arc<dyn ListenKeyProvider>>,
    pub(crate) listen_key: Mutex<Option<ListenKey>>,
    pub(crate) inner: Mutex<Inner<P::Topic>>,
    pub(crate) authenticated: AtomicBool,
    pub(crate) state_tx: watch::Sender<ConnectionState>,
    pub(crate) shutdown_tx: watch::Sender<bool>,
    /// Failed attempts and last error once the retry budget ran out
    pub(crate) exhausted: Mutex<Option<(u32, String)>>,
}

impl<P: Protocol> Shared<P> {
    pub(crate) fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "connection state changed");
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Error reported to waiters once the client is closed
    pub(crate) fn closed_error(&self) -> MexcError {
        match self.exhausted.lock().as_ref() {
            Some((attempts, last_error)) => MexcError::ReconnectExhausted {
                attempts: *attempts,
                last_error: last_error.clone(),
            },
            None => MexcError::ShuttingDown,
        }
    }

    /// URL for the next attempt, with the current listen key if any
    pub(crate) fn session_url(&self) -> String {
        let base = self
            .config
            .url
            .as_deref()
            .unwrap_or_else(|| self.protocol.default_url());
        match self.listen_key.lock().as_ref() {
            Some(key) if self.protocol.auth_mode() == AuthMode::ListenKey => {
                with_listen_key(base, &key.token)
            }
            _ => base.to_string(),
        }
    }

    /// Whether private topics can be authorized on this client
    pub(crate) fn can_authorize(&self) -> bool {
        match self.protocol.auth_mode() {
            AuthMode::ListenKey => self.listen_keys.is_some() || self.listen_key.lock().is_some(),
            AuthMode::LoginFrame => self.credentials.is_some(),
        }
    }

    /// Replace an expired listen key before connecting
    async fn refresh_listen_key(&self) {
        let Some(provider) = self.listen_keys.as_ref() else {
            return;
        };
        let expired = self
            .listen_key
            .lock()
            .as_ref()
            .map_or(false, ListenKey::is_expired);
        if !expired {
            return;
        }
        match provider.create_listen_key().await {
            Ok(key) => {
                info!("replaced expired listen key");
                *self.listen_key.lock() = Some(key);
            }
            Err(e) => warn!(error = %e, "failed to replace expired listen key"),
        }
    }
}

/// Resolve once shutdown has been requested
pub(crate) async fn shutdown_signal(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `delay`; returns false if shutdown interrupted it
async fn pause(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown_signal(shutdown) => false,
    }
}

/// Supervisor task body
///
/// A panic anywhere in the loop (including a caller callback) closes the
/// client instead of leaving it in its last published state.
pub(crate) async fn supervise<P: Protocol>(shared: Arc<Shared<P>>) -> MexcResult<()> {
    match AssertUnwindSafe(reconnect_loop(shared.clone())).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            error!("supervisor panicked, closing client");
            shared.inner.lock().outbound = None;
            shared.authenticated.store(false, Ordering::SeqCst);
            shared.shutdown_tx.send_replace(true);
            shared.set_state(ConnectionState::Closed);
            shared.hooks.invoke_error("supervisor panicked");
            Err(MexcError::WebSocket("supervisor panicked".to_string()))
        }
    }
}

/// Reconnect loop; returns the fatal error if the retry budget runs out
async fn reconnect_loop<P: Protocol>(shared: Arc<Shared<P>>) -> MexcResult<()> {
    let mut shutdown = shared.shutdown_tx.subscribe();
    let mut failures: u32 = 0;
    let mut sessions: u64 = 0;

    loop {
        if shared.is_shutting_down() {
            break;
        }

        shared.refresh_listen_key().await;
        let url = shared.session_url();

        let attempt = tokio::select! {
            result = establish(&shared, &url) => result,
            _ = shutdown_signal(&mut shutdown) => break,
        };

        match attempt {
            Ok(transport) => {
                failures = 0;
                sessions += 1;

                let reason = run_session(&shared, transport, sessions, &url, &mut shutdown).await;
                shared.inner.lock().outbound = None;
                shared.authenticated.store(false, Ordering::SeqCst);
                shared.hooks.invoke_disconnect(&reason);

                if reason == DisconnectInfo::Shutdown {
                    break;
                }
                warn!(reason = ?reason, session = sessions, "session ended");

                if !shared.config.restart_on_error {
                    info!("restart_on_error disabled, closing");
                    break;
                }

                shared.set_state(ConnectionState::Reconnecting);
                let delay = shared.config.reconnect.delay_with_jitter(1);
                if !pause(delay, &mut shutdown).await {
                    break;
                }
            }
            Err(e) => {
                failures += 1;

                if !shared.config.reconnect.should_retry(failures) {
                    error!(attempts = failures, error = %e, "reconnection attempts exhausted");
                    let message = e.to_string();
                    shared.hooks.invoke_error(&message);
                    *shared.exhausted.lock() = Some((failures, message.clone()));
                    shared.set_state(ConnectionState::Closed);
                    return Err(MexcError::ReconnectExhausted {
                        attempts: failures,
                        last_error: message,
                    });
                }

                let delay = shared.config.reconnect.delay_with_jitter(failures);
                warn!(
                    attempt = failures,
                    delay = ?delay,
                    error = %e,
                    "connection failed, retrying"
                );
                shared.hooks.invoke_reconnect_attempt(failures, delay);
                shared.set_state(ConnectionState::Reconnecting);

                if !pause(delay, &mut shutdown).await {
                    break;
                }
            }
        }
    }

    shared.set_state(ConnectionState::Closed);
    Ok(())
}

/// Open the transport and log in where the protocol needs it
async fn establish<P: Protocol>(shared: &Shared<P>, url: &str) -> MexcResult<Box<dyn Transport>> {
    shared.set_state(ConnectionState::Connecting);
    let shown = redact(url);
    info!(url = %shown, "connecting");

    let mut transport = shared
        .connector
        .connect(url, shared.config.connect_timeout)
        .await
        .map_err(|e| e.into_error(&shown))?;

    if shared.protocol.auth_mode() == AuthMode::LoginFrame {
        if let Some(credentials) = shared.credentials.as_ref() {
            authenticate(shared, transport.as_mut(), credentials).await?;
        }
    }

    Ok(transport)
}

/// Send the login frame and wait a bounded time for its ack
///
/// A rejected or missing ack keeps the session; public topics still work.
async fn authenticate<P: Protocol>(
    shared: &Shared<P>,
    transport: &mut dyn Transport,
    credentials: &Credentials,
) -> MexcResult<()> {
    let Some(frame) = shared.protocol.login_frame(credentials, timestamp_ms())? else {
        return Ok(());
    };

    shared.set_state(ConnectionState::Authenticating);
    transport.send(&frame).await?;

    let deadline = Instant::now() + shared.config.auth_timeout;
    loop {
        match tokio::time::timeout_at(deadline, transport.recv()).await {
            Err(_) => {
                warn!(
                    timeout = ?shared.config.auth_timeout,
                    "login not acknowledged, continuing without authentication"
                );
                return Ok(());
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(None)) => {
                return Err(MexcError::WebSocket(
                    "connection closed during login".to_string(),
                ))
            }
            Ok(Ok(Some(frame))) => {
                if let Routed::Auth(_) = router::route(shared, &frame) {
                    return Ok(());
                }
            }
        }
    }
}

/// Drive one ready session until it fails or shutdown is requested
async fn run_session<P: Protocol>(
    shared: &Shared<P>,
    mut transport: Box<dyn Transport>,
    session: u64,
    url: &str,
    shutdown: &mut watch::Receiver<bool>,
) -> DisconnectInfo {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let replay = {
        let mut inner = shared.inner.lock();
        inner.registry.mark_all_pending();
        let topics = inner.registry.topics();
        inner.outbound = Some(tx);
        shared.protocol.subscribe_frames(&topics, &topics)
    };
    shared.set_state(ConnectionState::Ready);

    let replay = match replay {
        Ok(frames) => frames,
        Err(e) => {
            error!(error = %e, "failed to build replay envelopes");
            Vec::new()
        }
    };
    for frame in &replay {
        if let Err(e) = transport.send(frame).await {
            let _ = transport.close().await;
            return DisconnectInfo::NetworkError(e.to_string());
        }
    }
    if !replay.is_empty() {
        debug!(envelopes = replay.len(), "subscriptions replayed");
    }

    info!(session, "session ready");
    shared.hooks.invoke_connect(&ConnectInfo {
        url: redact(url),
        is_reconnection: session > 1,
        session,
    });

    let mut ping = keepalive::ping_ticker(shared.config.ping_interval);

    let reason = loop {
        tokio::select! {
            _ = shutdown_signal(shutdown) => {
                while let Ok(msg) = rx.try_recv() {
                    if transport.send(&msg).await.is_err() {
                        break;
                    }
                }
                break DisconnectInfo::Shutdown;
            }
            Some(msg) = rx.recv() => {
                if let Err(e) = transport.send(&msg).await {
                    break DisconnectInfo::NetworkError(e.to_string());
                }
            }
            frame = transport.recv() => match frame {
                Ok(Some(frame)) => {
                    router::route(shared, &frame);
                }
                Ok(None) => break DisconnectInfo::ServerClosed,
                Err(e) => break DisconnectInfo::NetworkError(e.to_string()),
            },
            _ = ping.tick() => {
                if let Err(e) = transport.send(shared.protocol.ping_frame()).await {
                    break DisconnectInfo::PingFailed(e.to_string());
                }
            }
        }
    };

    if let Err(e) = transport.close().await {
        debug!(error = %e, "close after session end failed");
    }
    reason
}
