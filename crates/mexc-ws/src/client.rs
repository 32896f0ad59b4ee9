//! Stream client
//!
//! [`StreamClient`] is written once against [`Protocol`]; `SpotClient` and
//! `FuturesClient` are aliases with protocol-specific convenience wrappers.
//!
//! # Example
//!
//! ```no_run
//! use mexc_ws::{SpotClient, SpotTopic};
//! use mexc_types::Speed;
//!
//! # async fn example() -> Result<(), mexc_types::MexcError> {
//! let client = SpotClient::new();
//! client.connect().await?;
//!
//! let key = client
//!     .subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), |msg| {
//!         println!("{}: {}", msg.topic, msg.payload);
//!     })
//!     .await?;
//!
//! client.unsubscribe(key.as_str())?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

use crate::codec::{FrameDecoder, JsonDecoder};
use crate::connection::{self, ConnectionConfig, ConnectionState, Inner, Shared};
use crate::hooks::Hooks;
use crate::keepalive;
use crate::protocol::{AuthMode, Protocol, StreamKind, Topic};
use crate::subscription::{Callback, Registry, StreamMessage, Subscription, SubscriptionStatus};
use crate::transport::{Connector, WsConnector};

use ::futures::future::BoxFuture;
use ::futures::FutureExt;
use mexc_auth::{Credentials, ListenKey, ListenKeyProvider};
use mexc_types::{MexcError, MexcResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What to unsubscribe: one key, or everything a convenience stream subscribed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsubscribe<S> {
    /// One registry key
    Key(String),
    /// Every key of the stream's topic kind
    Stream(S),
}

impl<S> From<&str> for Unsubscribe<S> {
    fn from(key: &str) -> Self {
        Unsubscribe::Key(key.to_string())
    }
}

impl<S> From<String> for Unsubscribe<S> {
    fn from(key: String) -> Self {
        Unsubscribe::Key(key)
    }
}

impl<S> From<&String> for Unsubscribe<S> {
    fn from(key: &String) -> Self {
        Unsubscribe::Key(key.clone())
    }
}

/// Builder for [`StreamClient`]
pub struct StreamClientBuilder<P: Protocol> {
    protocol: P,
    config: ConnectionConfig,
    connector: Option<Arc<dyn Connector>>,
    decoder: Option<Arc<dyn FrameDecoder>>,
    hooks: Hooks,
    credentials: Option<Credentials>,
    listen_key: Option<ListenKey>,
    listen_keys: Option<Arc<dyn ListenKeyProvider>>,
}

impl<P: Protocol> StreamClientBuilder<P> {
    fn new(protocol: P) -> Self {
        Self {
            protocol,
            config: ConnectionConfig::default(),
            connector: None,
            decoder: None,
            hooks: Hooks::default(),
            credentials: None,
            listen_key: None,
            listen_keys: None,
        }
    }

    /// Connection, reconnect, and keep-alive settings
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the WebSocket connector (tests use `MockConnector`)
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Decoder for inbound frames; needed for spot protobuf mode
    pub fn with_decoder(mut self, decoder: impl FrameDecoder + 'static) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    /// Observability callbacks
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// API key pair, used for the futures login frame
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Pre-issued spot listen key
    pub fn with_listen_key(mut self, key: ListenKey) -> Self {
        self.listen_key = Some(key);
        self
    }

    /// Source of spot listen keys; enables creation and renewal
    pub fn with_listen_key_provider(mut self, provider: Arc<dyn ListenKeyProvider>) -> Self {
        self.listen_keys = Some(provider);
        self
    }

    /// Build the client; nothing connects until `connect` or the first `subscribe`
    pub fn build(self) -> StreamClient<P> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);
        let registry = Registry::new(self.protocol.max_topics());

        let shared = Shared {
            config: self.config,
            protocol: self.protocol,
            connector: self.connector.unwrap_or_else(|| Arc::new(WsConnector)),
            decoder: self.decoder.unwrap_or_else(|| Arc::new(JsonDecoder)),
            hooks: self.hooks,
            credentials: self.credentials,
            listen_keys: self.listen_keys,
            listen_key: Mutex::new(self.listen_key),
            inner: Mutex::new(Inner {
                registry,
                outbound: None,
            }),
            authenticated: AtomicBool::new(false),
            state_tx,
            shutdown_tx,
            exhausted: Mutex::new(None),
        };

        StreamClient {
            shared: Arc::new(shared),
            started: AtomicBool::new(false),
            owns_listen_key: AtomicBool::new(false),
            supervisor: Mutex::new(None),
            renewal: Mutex::new(None),
        }
    }
}

/// Persistent stream client for one protocol
pub struct StreamClient<P: Protocol> {
    shared: Arc<Shared<P>>,
    started: AtomicBool,
    /// The listen key was created here and is closed on exit
    owns_listen_key: AtomicBool,
    supervisor: Mutex<Option<JoinHandle<MexcResult<()>>>>,
    renewal: Mutex<Option<JoinHandle<()>>>,
}

impl<P: Protocol> StreamClient<P> {
    /// Start building a client for `protocol`
    pub fn builder(protocol: P) -> StreamClientBuilder<P> {
        StreamClientBuilder::new(protocol)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Watch connection state changes
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Whether the server accepted the login frame in the current session
    pub fn is_authenticated(&self) -> bool {
        self.shared.authenticated.load(Ordering::SeqCst)
    }

    /// Registered keys in registration order
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.shared.inner.lock().registry.keys()
    }

    pub fn is_subscribed(&self, key: &str) -> bool {
        self.shared.inner.lock().registry.contains(key)
    }

    /// Ack state of a registered key
    pub fn subscription_status(&self, key: &str) -> Option<SubscriptionStatus> {
        self.shared.inner.lock().registry.status(key)
    }

    /// Current spot listen key, if any
    pub fn listen_key(&self) -> Option<ListenKey> {
        self.shared.listen_key.lock().clone()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    pub fn protocol(&self) -> &P {
        &self.shared.protocol
    }

    /// Connect and wait for the first ready session
    ///
    /// Idempotent. Fails with `ReconnectExhausted` when the retry budget
    /// runs out before any session is ready.
    pub async fn connect(&self) -> MexcResult<()> {
        self.ensure_open()?;
        self.start().await?;

        let mut state = self.shared.state_tx.subscribe();
        let reached = state
            .wait_for(|s| matches!(s, ConnectionState::Ready | ConnectionState::Closed))
            .await
            .map(|s| *s)
            .unwrap_or(ConnectionState::Closed);

        match reached {
            ConnectionState::Ready => Ok(()),
            _ => Err(self.shared.closed_error()),
        }
    }

    /// Wait until the client is closed
    ///
    /// Returns the fatal error if the retry budget ran out.
    pub async fn closed(&self) -> MexcResult<()> {
        let mut state = self.shared.state_tx.subscribe();
        let _ = state.wait_for(ConnectionState::is_terminal).await.map(|_| ());
        match self.shared.exhausted.lock().as_ref() {
            Some((attempts, last_error)) => Err(MexcError::ReconnectExhausted {
                attempts: *attempts,
                last_error: last_error.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Spawn the supervisor (and renewal loop) once
    async fn start(&self) -> MexcResult<()> {
        self.shared.config.validate()?;
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.prepare_listen_key().await {
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let supervisor = tokio::spawn(connection::supervise(self.shared.clone()));
        *self.supervisor.lock() = Some(supervisor);
        Ok(())
    }

    async fn prepare_listen_key(&self) -> MexcResult<()> {
        if self.shared.protocol.auth_mode() != AuthMode::ListenKey {
            return Ok(());
        }
        let Some(provider) = self.shared.listen_keys.clone() else {
            return Ok(());
        };

        let missing = self.shared.listen_key.lock().is_none();
        if missing {
            let key = provider.create_listen_key().await?;
            info!("listen key created");
            *self.shared.listen_key.lock() = Some(key);
            self.owns_listen_key.store(true, Ordering::SeqCst);
        }

        let renewal = tokio::spawn(keepalive::renew_listen_key(self.shared.clone(), provider));
        *self.renewal.lock() = Some(renewal);
        Ok(())
    }

    fn ensure_open(&self) -> MexcResult<()> {
        if self.shared.is_shutting_down() || self.state().is_terminal() {
            return Err(self.shared.closed_error());
        }
        Ok(())
    }

    /// Subscribe one topic; returns its key
    ///
    /// Usage errors are returned before anything is sent. Connects lazily;
    /// while no session is ready the topic is sent on the next replay.
    pub async fn subscribe<F>(&self, topic: P::Topic, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        let keys = self.subscribe_with(vec![topic], Arc::new(callback)).await?;
        Ok(keys.into_iter().next().unwrap_or_default())
    }

    /// Subscribe several topics with one callback
    ///
    /// Registration is all or nothing. Protocols that batch (spot) send a
    /// single envelope.
    pub async fn subscribe_many<F>(&self, topics: Vec<P::Topic>, callback: F) -> MexcResult<Vec<String>>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe_with(topics, Arc::new(callback)).await
    }

    pub(crate) async fn subscribe_with(
        &self,
        topics: Vec<P::Topic>,
        callback: Callback,
    ) -> MexcResult<Vec<String>> {
        self.ensure_open()?;
        if topics.is_empty() {
            return Ok(Vec::new());
        }

        let protocol = &self.shared.protocol;
        let mut keys = Vec::with_capacity(topics.len());
        let mut seen = HashSet::with_capacity(topics.len());
        for topic in &topics {
            protocol.validate(topic)?;
            let key = protocol.topic_key(topic);
            if topic.visibility().is_private() && !self.shared.can_authorize() {
                return Err(MexcError::AuthRequired { topic: key });
            }
            if !seen.insert(key.clone()) {
                return Err(MexcError::DuplicateSubscription { topic: key });
            }
            keys.push(key);
        }

        self.shared
            .inner
            .lock()
            .registry
            .check_insert(keys.iter().map(String::as_str))?;

        self.start().await?;

        let mut inner = self.shared.inner.lock();
        inner.registry.check_insert(keys.iter().map(String::as_str))?;

        let mut registered = inner.registry.topics();
        registered.extend(topics.iter().cloned());
        let frames = protocol.subscribe_frames(&topics, &registered)?;

        let variant = protocol.variant();
        let subs = topics
            .into_iter()
            .zip(keys.iter().cloned())
            .map(|(topic, key)| Subscription {
                key,
                visibility: topic.visibility(),
                topic,
                callback: callback.clone(),
                variant,
                status: SubscriptionStatus::Pending,
            })
            .collect();
        inner.registry.register_all(subs)?;

        match inner.outbound.as_ref() {
            Some(outbound) => {
                for frame in frames {
                    if outbound.send(frame).is_err() {
                        debug!("session ended before send, topic queued for replay");
                        break;
                    }
                }
            }
            None => debug!(keys = ?keys, "no ready session, topics queued for replay"),
        }

        debug!(keys = ?keys, "subscribed");
        Ok(keys)
    }

    /// Unsubscribe a key or every topic of a stream; returns removed keys
    pub fn unsubscribe(&self, target: impl Into<Unsubscribe<P::Stream>>) -> MexcResult<Vec<String>> {
        let target = target.into();
        let mut inner = self.shared.inner.lock();

        let (label, keys) = match target {
            Unsubscribe::Key(key) => {
                let keys = if inner.registry.contains(&key) {
                    vec![key.clone()]
                } else {
                    Vec::new()
                };
                (key, keys)
            }
            Unsubscribe::Stream(stream) => {
                (stream.kind().to_string(), inner.registry.keys_of_kind(stream.kind()))
            }
        };
        if keys.is_empty() {
            return Err(MexcError::UnknownTopic { topic: label });
        }

        let (removed, remaining): (Vec<_>, Vec<_>) = inner
            .registry
            .snapshot()
            .into_iter()
            .partition(|sub| keys.contains(&sub.key));
        let removed: Vec<P::Topic> = removed.into_iter().map(|s| s.topic).collect();
        let remaining: Vec<P::Topic> = remaining.into_iter().map(|s| s.topic).collect();

        let frames = self.shared.protocol.unsubscribe_frames(&removed, &remaining)?;
        if let Some(outbound) = inner.outbound.as_ref() {
            for frame in frames {
                let _ = outbound.send(frame);
            }
        }
        for key in &keys {
            inner.registry.unregister(key);
        }

        debug!(keys = ?keys, "unsubscribed");
        Ok(keys)
    }

    /// Unsubscribe every topic; returns removed keys
    pub fn unsubscribe_all(&self) -> MexcResult<Vec<String>> {
        let mut inner = self.shared.inner.lock();
        if inner.registry.is_empty() {
            return Ok(Vec::new());
        }

        let topics = inner.registry.topics();
        let frames = self.shared.protocol.unsubscribe_frames(&topics, &[])?;
        if let Some(outbound) = inner.outbound.as_ref() {
            for frame in frames {
                let _ = outbound.send(frame);
            }
        }

        let keys = inner.registry.clear().into_iter().map(|s| s.key).collect::<Vec<_>>();
        debug!(count = keys.len(), "unsubscribed all");
        Ok(keys)
    }

    /// Stop every loop, close the socket, and clear the registry
    pub async fn exit(&self) {
        self.shared.shutdown_tx.send_replace(true);

        let supervisor = self.supervisor.lock().take();
        if let Some(handle) = supervisor {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "supervisor ended with error"),
                Err(e) => warn!(error = %e, "supervisor task failed"),
            }
        }
        let renewal = self.renewal.lock().take();
        if let Some(handle) = renewal {
            let _ = handle.await;
        }

        if self.owns_listen_key.swap(false, Ordering::SeqCst) {
            self.close_listen_key().await;
        }

        {
            let mut inner = self.shared.inner.lock();
            inner.outbound = None;
            inner.registry.clear();
        }
        self.shared.authenticated.store(false, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Closed);
        info!("client closed");
    }

    async fn close_listen_key(&self) {
        let Some(provider) = self.shared.listen_keys.clone() else {
            return;
        };
        let token = self.shared.listen_key.lock().take().map(|k| k.token);
        if let Some(token) = token {
            if let Err(e) = provider.close_listen_key(&token).await {
                warn!(error = %e, "failed to close listen key");
            }
        }
    }

    /// Unsubscribe everything (best effort), then exit
    pub async fn close(&self) {
        if let Err(e) = self.unsubscribe_all() {
            debug!(error = %e, "unsubscribe before close failed");
        }
        self.exit().await;
    }

    /// Connect, run `f`, and close on every exit path
    ///
    /// A panic inside `f` is resumed after the client is closed.
    pub async fn scope<F, T>(&self, f: F) -> MexcResult<T>
    where
        F: for<'a> FnOnce(&'a Self) -> BoxFuture<'a, T>,
    {
        if let Err(e) = self.connect().await {
            self.close().await;
            return Err(e);
        }

        let outcome = AssertUnwindSafe(async { f(self).await }).catch_unwind().await;
        self.close().await;

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl<P: Protocol> Drop for StreamClient<P> {
    fn drop(&mut self) {
        self.shared.shutdown_tx.send_replace(true);
    }
}

impl<P: Protocol> std::fmt::Debug for StreamClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("variant", &self.shared.protocol.variant())
            .field("state", &self.state())
            .field("topics", &self.shared.inner.lock().registry.len())
            .finish()
    }
}

impl<P: Protocol> std::fmt::Debug for StreamClientBuilder<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClientBuilder")
            .field("variant", &self.protocol.variant())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::SubscriptionInfo;
    use crate::protocol::{
        FuturesProtocol, FuturesStream, FuturesTopic, PersonalTopic, SpotProtocol, SpotTopic,
        SPOT_MAX_TOPICS,
    };
    use crate::transport::{MockConnector, MockServer};
    use async_trait::async_trait;
    use mexc_auth::AuthResult;
    use mexc_types::{KlineInterval, Speed};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    const DEALS: &str = "spot@public.aggre.deals.v3.api@100ms@BTCUSDT";
    const KLINE: &str = "spot@public.kline.v3.api@BTCUSDT@Min1";

    fn quiet() -> ConnectionConfig {
        ConnectionConfig::new().with_ping_interval(Duration::from_secs(24 * 3600))
    }

    fn spot(config: ConnectionConfig) -> (StreamClient<SpotProtocol>, MockServer) {
        let (connector, server) = MockConnector::new();
        let client = StreamClient::builder(SpotProtocol::json())
            .with_config(config)
            .with_connector(connector)
            .build();
        (client, server)
    }

    fn futures(builder: StreamClientBuilder<FuturesProtocol>) -> (StreamClient<FuturesProtocol>, MockServer) {
        let (connector, server) = MockConnector::new();
        (builder.with_connector(connector).build(), server)
    }

    fn recorder() -> (
        impl Fn(&StreamMessage) + Send + Sync + 'static,
        mpsc::UnboundedReceiver<StreamMessage>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |msg: &StreamMessage| {
                let _ = tx.send(msg.clone());
            },
            rx,
        )
    }

    fn deal_frame(channel: &str) -> String {
        format!(
            r#"{{"c":"{}","d":{{"deals":[{{"p":"93220.00","v":"0.1","S":1,"t":1}}]}},"s":"BTCUSDT","t":1}}"#,
            channel
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_sends_each_topic_once_per_session() {
        let (client, mut server) = spot(quiet());
        client.connect().await.unwrap();
        let mut first = server.accept().await.unwrap();

        client
            .subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), |_| {})
            .await
            .unwrap();
        client
            .subscribe(SpotTopic::kline("BTCUSDT", KlineInterval::Min1), |_| {})
            .await
            .unwrap();
        assert_eq!(
            first.next_sent().await.unwrap(),
            format!(r#"{{"method":"SUBSCRIPTION","params":["{}"]}}"#, DEALS)
        );
        assert_eq!(
            first.next_sent().await.unwrap(),
            format!(r#"{{"method":"SUBSCRIPTION","params":["{}"]}}"#, KLINE)
        );

        first.push_close();
        let mut second = server.accept().await.unwrap();
        assert_eq!(
            second.next_sent().await.unwrap(),
            format!(r#"{{"method":"SUBSCRIPTION","params":["{}","{}"]}}"#, DEALS, KLINE)
        );

        client
            .subscribe(SpotTopic::AccountOrders, |_| {})
            .await
            .unwrap_err();
        client
            .subscribe(SpotTopic::book_ticker_batch("ETHUSDT"), |_| {})
            .await
            .unwrap();
        assert_eq!(
            second.next_sent().await.unwrap(),
            r#"{"method":"SUBSCRIPTION","params":["spot@public.bookTicker.batch.v3.api@ETHUSDT"]}"#
        );
        assert!(second.take_sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_subscription_keeps_original() {
        let (client, mut server) = spot(quiet());
        client.connect().await.unwrap();
        let mut session = server.accept().await.unwrap();

        let (original, mut delivered) = recorder();
        client
            .subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), original)
            .await
            .unwrap();
        let err = client
            .subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), |_| {
                panic!("replacement callback must never run")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MexcError::DuplicateSubscription { ref topic } if topic == DEALS));

        session.next_sent().await.unwrap();
        assert!(session.take_sent().is_empty());

        session.push_text(deal_frame(DEALS));
        let msg = delivered.recv().await.unwrap();
        assert_eq!(msg.topic, DEALS);
        assert_eq!(msg.payload["s"], "BTCUSDT");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_stops_callbacks() {
        let (client, mut server) = spot(quiet());
        client.connect().await.unwrap();
        let mut session = server.accept().await.unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let key = client
            .subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        let (marker, mut marked) = recorder();
        client
            .subscribe(SpotTopic::kline("BTCUSDT", KlineInterval::Min1), marker)
            .await
            .unwrap();

        session.push_text(deal_frame(DEALS));
        session.push_text(deal_frame(KLINE));
        marked.recv().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert_eq!(client.unsubscribe(key.as_str()).unwrap(), vec![DEALS]);
        session.take_sent();
        session.push_text(deal_frame(DEALS));
        session.push_text(deal_frame(KLINE));
        marked.recv().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!client.is_subscribed(DEALS));

        let err = client.unsubscribe(key.as_str()).unwrap_err();
        assert!(matches!(err, MexcError::UnknownTopic { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_sends_envelope_before_removal() {
        let (client, mut server) = spot(quiet());
        client.connect().await.unwrap();
        let mut session = server.accept().await.unwrap();

        client
            .subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), |_| {})
            .await
            .unwrap();
        session.next_sent().await.unwrap();

        client.unsubscribe(Unsubscribe::Stream(crate::protocol::SpotStream::Deals)).unwrap();
        assert_eq!(
            session.next_sent().await.unwrap(),
            format!(r#"{{"method":"UNSUBSCRIPTION","params":["{}"]}}"#, DEALS)
        );
        assert!(client.subscribed_topics().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nack_removes_subscription() {
        let (tx, mut infos) = mpsc::unbounded_channel::<SubscriptionInfo>();
        let hooks = Hooks::new().on_subscription(move |info| {
            let _ = tx.send(info.clone());
        });
        let (connector, mut server) = MockConnector::new();
        let client = StreamClient::builder(SpotProtocol::json())
            .with_config(quiet())
            .with_connector(connector)
            .with_hooks(hooks)
            .build();

        client.connect().await.unwrap();
        let mut session = server.accept().await.unwrap();
        client
            .subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), |_| {})
            .await
            .unwrap();
        client
            .subscribe(SpotTopic::kline("BTCUSDT", KlineInterval::Min1), |_| {})
            .await
            .unwrap();
        session.next_sent().await.unwrap();

        session.push_text(format!(r#"{{"id":0,"code":0,"msg":"{}"}}"#, KLINE));
        session.push_text(format!(
            r#"{{"id":0,"code":0,"msg":"Not Subscribed successfully! [{}].  Reason： Blocked! "}}"#,
            DEALS
        ));

        let accepted = infos.recv().await.unwrap();
        assert_eq!(accepted.key, KLINE);
        assert!(accepted.accepted);

        let rejected = infos.recv().await.unwrap();
        assert_eq!(rejected.key, DEALS);
        assert!(!rejected.accepted);
        assert!(rejected.reason.unwrap().contains("Blocked"));

        assert_eq!(client.subscribed_topics(), vec![KLINE]);
        assert_eq!(client.subscription_status(KLINE), Some(SubscriptionStatus::Active));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_is_exact() {
        let (client, server) = spot(quiet().with_retries(3));
        server.refuse_all();

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, MexcError::ReconnectExhausted { attempts: 3, .. }));

        let attempts = server.attempts();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[1].1 - attempts[0].1, Duration::from_secs(1));
        assert_eq!(attempts[2].1 - attempts[1].1, Duration::from_secs(1));
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(client.closed().await.is_err());

        let err = client
            .subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, MexcError::ReconnectExhausted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_resets_after_ready_session() {
        let (client, mut server) = spot(quiet().with_retries(2));
        client.connect().await.unwrap();
        let first = server.accept().await.unwrap();

        server.refuse_next(1);
        first.push_close();

        let _second = server.accept().await.unwrap();
        assert_eq!(server.attempts().len(), 3);
        assert!(client.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_restart_closes_after_session_failure() {
        let (client, mut server) = spot(quiet().without_restart());
        client.connect().await.unwrap();
        let session = server.accept().await.unwrap();

        session.push_close();
        client.closed().await.unwrap();
        assert_eq!(server.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_failure_reconnects() {
        let (client, mut server) =
            spot(ConnectionConfig::new().with_ping_interval(Duration::from_secs(20)));
        client.connect().await.unwrap();
        let mut first = server.accept().await.unwrap();

        assert_eq!(first.next_sent().await.unwrap(), r#"{"method":"PING"}"#);
        first.fail_sends();

        let _second = server.accept().await.unwrap();
        assert_eq!(server.attempts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spot_topic_limit() {
        let (client, _server) = spot(quiet());
        let topics = (0..SPOT_MAX_TOPICS)
            .map(|i| SpotTopic::deals(format!("SYM{}USDT", i), Speed::Ms100))
            .collect();
        client.subscribe_many(topics, |_| {}).await.unwrap();

        let err = client
            .subscribe(SpotTopic::deals("EXTRAUSDT", Speed::Ms100), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, MexcError::SubscriptionLimit { limit: 30 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_private_topic_requires_auth() {
        let (client, server) = spot(quiet());
        let err = client
            .subscribe(SpotTopic::AccountDeals, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, MexcError::AuthRequired { .. }));
        assert!(server.attempts().is_empty());

        let (client, _server) = futures(StreamClient::builder(FuturesProtocol).with_config(quiet()));
        let err = client
            .subscribe(FuturesTopic::Personal(PersonalTopic::Order), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, MexcError::AuthRequired { ref topic } if topic == "personal.order"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_futures_login_and_personal_filter() {
        let credentials = Credentials::new("api-key", "api-secret").unwrap();
        let (client, mut server) = futures(
            StreamClient::builder(FuturesProtocol)
                .with_config(quiet())
                .with_credentials(credentials),
        );

        let (connected, (mut session, login)) = tokio::join!(client.connect(), async {
            let mut session = server.accept().await.unwrap();
            let login = session.next_sent().await.unwrap();
            session.push_text(r#"{"channel":"rs.login","data":"success","ts":1}"#);
            (session, login)
        });
        connected.unwrap();

        let login: serde_json::Value = serde_json::from_str(&login).unwrap();
        assert_eq!(login["method"], "login");
        assert_eq!(login["param"]["apiKey"], "api-key");
        assert!(client.is_authenticated());

        client
            .subscribe(FuturesTopic::Personal(PersonalTopic::Order), |_| {})
            .await
            .unwrap();
        assert_eq!(
            session.next_sent().await.unwrap(),
            r#"{"method":"personal.filter","param":{"filters":[{"filter":"order"}]}}"#
        );

        let (callback, mut orders) = recorder();
        client
            .subscribe(FuturesTopic::Personal(PersonalTopic::Asset), callback)
            .await
            .unwrap();
        assert_eq!(
            session.next_sent().await.unwrap(),
            r#"{"method":"personal.filter","param":{"filters":[{"filter":"order"},{"filter":"asset"}]}}"#
        );

        session.push_text(r#"{"channel":"push.personal.asset","data":{"currency":"USDT"}}"#);
        assert_eq!(orders.recv().await.unwrap().topic, "personal.asset");
    }

    #[tokio::test(start_paused = true)]
    async fn test_futures_login_timeout_keeps_session() {
        let credentials = Credentials::new("api-key", "api-secret").unwrap();
        let (client, mut server) = futures(
            StreamClient::builder(FuturesProtocol)
                .with_config(quiet())
                .with_credentials(credentials),
        );

        let start = Instant::now();
        let (connected, _session) = tokio::join!(client.connect(), server.accept());
        connected.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert!(!client.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_futures_routing_and_stream_unsubscribe() {
        let (client, mut server) = futures(StreamClient::builder(FuturesProtocol).with_config(quiet()));
        client.connect().await.unwrap();
        let mut session = server.accept().await.unwrap();

        let (callback, mut received) = recorder();
        client
            .subscribe_many(
                vec![FuturesTopic::deal("BTC_USDT"), FuturesTopic::deal("ETH_USDT")],
                callback,
            )
            .await
            .unwrap();
        assert_eq!(
            session.next_sent().await.unwrap(),
            r#"{"method":"sub.deal","param":{"symbol":"BTC_USDT"}}"#
        );
        assert_eq!(
            session.next_sent().await.unwrap(),
            r#"{"method":"sub.deal","param":{"symbol":"ETH_USDT"}}"#
        );

        session.push_text(r#"{"channel":"rs.sub.deal","data":"success"}"#);
        session.push_text(r#"{"channel":"push.deal","data":{"p":1.0},"symbol":"ETH_USDT"}"#);
        assert_eq!(received.recv().await.unwrap().topic, "deal:ETH_USDT");
        assert_eq!(
            client.subscription_status("deal:BTC_USDT"),
            Some(SubscriptionStatus::Active)
        );
        assert_eq!(
            client.subscription_status("deal:ETH_USDT"),
            Some(SubscriptionStatus::Pending)
        );

        let removed = client.unsubscribe(FuturesStream::Deal).unwrap();
        assert_eq!(removed, vec!["deal:BTC_USDT", "deal:ETH_USDT"]);
        assert_eq!(
            session.next_sent().await.unwrap(),
            r#"{"method":"unsub.deal","param":{"symbol":"BTC_USDT"}}"#
        );
        assert_eq!(
            session.next_sent().await.unwrap(),
            r#"{"method":"unsub.deal","param":{"symbol":"ETH_USDT"}}"#
        );
    }

    fn status_hooks() -> (Hooks, mpsc::UnboundedReceiver<SubscriptionInfo>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hooks = Hooks::new().on_subscription(move |info| {
            let _ = tx.send(info.clone());
        });
        (hooks, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_after_resubscribe_removes_key() {
        let (hooks, mut infos) = status_hooks();
        let (connector, mut server) = MockConnector::new();
        let client = StreamClient::builder(SpotProtocol::json())
            .with_config(quiet())
            .with_connector(connector)
            .with_hooks(hooks)
            .build();
        client.connect().await.unwrap();
        let mut session = server.accept().await.unwrap();
        let ack = format!(r#"{{"id":0,"code":0,"msg":"{}"}}"#, DEALS);

        let key = client
            .subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), |_| {})
            .await
            .unwrap();
        session.next_sent().await.unwrap();
        session.push_text(ack.clone());
        assert!(infos.recv().await.unwrap().accepted);

        client.unsubscribe(key.as_str()).unwrap();
        assert_eq!(
            session.next_sent().await.unwrap(),
            format!(r#"{{"method":"UNSUBSCRIPTION","params":["{}"]}}"#, DEALS)
        );
        client
            .subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), |_| {})
            .await
            .unwrap();
        session.next_sent().await.unwrap();

        // the unsubscribe ack has the same shape as a subscribe ack
        session.push_text(ack);
        assert!(infos.recv().await.unwrap().accepted);
        assert_eq!(client.subscription_status(DEALS), Some(SubscriptionStatus::Active));

        session.push_text(format!(
            r#"{{"id":0,"code":0,"msg":"Not Subscribed successfully! [{}].  Reason： Blocked! "}}"#,
            DEALS
        ));
        let rejected = infos.recv().await.unwrap();
        assert_eq!(rejected.key, DEALS);
        assert!(!rejected.accepted);
        assert!(!client.is_subscribed(DEALS));
        assert!(client.subscribed_topics().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_frame_keeps_session() {
        let (client, mut server) = spot(quiet());
        client.connect().await.unwrap();
        let session = server.accept().await.unwrap();

        let (callback, mut received) = recorder();
        client
            .subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), callback)
            .await
            .unwrap();

        session.push_text("{not json");
        session.push_binary(vec![0xff, 0x00, 0x13]);
        session.push_text(deal_frame(DEALS));

        assert_eq!(received.recv().await.unwrap().topic, DEALS);
        assert_eq!(client.state(), ConnectionState::Ready);
        assert_eq!(server.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_futures_sub_rejection_removes_topic() {
        let (hooks, mut infos) = status_hooks();
        let (client, mut server) = futures(
            StreamClient::builder(FuturesProtocol)
                .with_config(quiet())
                .with_hooks(hooks),
        );
        client.connect().await.unwrap();
        let mut session = server.accept().await.unwrap();

        client.subscribe(FuturesTopic::deal("NOPE_USDT"), |_| {}).await.unwrap();
        client.subscribe(FuturesTopic::ticker("BTC_USDT"), |_| {}).await.unwrap();
        session.next_sent().await.unwrap();
        session.next_sent().await.unwrap();

        session.push_text(r#"{"channel":"rs.sub.deal","data":"invalid symbol"}"#);
        let rejected = infos.recv().await.unwrap();
        assert_eq!(rejected.key, "deal:NOPE_USDT");
        assert!(!rejected.accepted);
        assert_eq!(rejected.reason.as_deref(), Some("invalid symbol"));

        assert!(!client.is_subscribed("deal:NOPE_USDT"));
        assert_eq!(client.subscribed_topics(), vec!["ticker:BTC_USDT"]);
        assert!(client.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_intervals_fail_before_connecting() {
        let configs = [
            quiet().with_ping_interval(Duration::ZERO),
            quiet().with_renew_interval(Duration::ZERO),
        ];
        for config in configs {
            let (client, server) = spot(config);

            let err = client.connect().await.unwrap_err();
            assert!(matches!(err, MexcError::Configuration(_)));
            let err = client
                .subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), |_| {})
                .await
                .unwrap_err();
            assert!(matches!(err, MexcError::Configuration(_)));

            assert!(server.attempts().is_empty());
            assert!(client.subscribed_topics().is_empty());
            assert_eq!(client.state(), ConnectionState::Disconnected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_callback_closes_client() {
        let (client, mut server) = spot(quiet());
        client.connect().await.unwrap();
        let session = server.accept().await.unwrap();

        client
            .subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), |_| {
                panic!("callback failure")
            })
            .await
            .unwrap();
        session.push_text(deal_frame(DEALS));

        client.closed().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(!client.is_ready());

        let err = client
            .subscribe(SpotTopic::kline("BTCUSDT", KlineInterval::Min1), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, MexcError::ShuttingDown));
        assert_eq!(server.attempts().len(), 1);
        client.exit().await;
    }

    #[derive(Default)]
    struct CountingProvider {
        created: AtomicUsize,
        renewals: parking_lot::Mutex<Vec<(String, Instant)>>,
        closed: parking_lot::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ListenKeyProvider for CountingProvider {
        async fn create_listen_key(&self) -> AuthResult<ListenKey> {
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ListenKey::new(format!("lk-{}", n)))
        }

        async fn renew_listen_key(&self, token: &str) -> AuthResult<()> {
            self.renewals.lock().push((token.to_string(), Instant::now()));
            Ok(())
        }

        async fn close_listen_key(&self, token: &str) -> AuthResult<()> {
            self.closed.lock().push(token.to_string());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_listen_key_renewal_timing() {
        let provider = Arc::new(CountingProvider::default());
        let (connector, mut server) = MockConnector::new();
        let client = StreamClient::builder(SpotProtocol::json())
            .with_config(quiet())
            .with_connector(connector)
            .with_listen_key_provider(provider.clone())
            .build();

        let start = Instant::now();
        client.connect().await.unwrap();
        let first = server.accept().await.unwrap();
        assert!(first.url().ends_with("/ws?listenKey=lk-1"));

        client.subscribe(SpotTopic::AccountOrders, |_| {}).await.unwrap();

        tokio::time::sleep(Duration::from_secs(90 * 60)).await;
        first.push_close();
        let second = server.accept().await.unwrap();
        assert!(second.url().ends_with("?listenKey=lk-1"));

        tokio::time::sleep_until(start + Duration::from_secs(177 * 60 + 1)).await;

        let renewals = provider.renewals.lock().clone();
        assert_eq!(renewals.len(), 3);
        for (i, (token, at)) in renewals.iter().enumerate() {
            assert_eq!(token, "lk-1");
            assert_eq!(*at - start, Duration::from_secs(59 * 60 * (i as u64 + 1)));
        }
        assert_eq!(provider.created.load(Ordering::SeqCst), 1);

        client.exit().await;
        assert_eq!(provider.closed.lock().clone(), vec!["lk-1"]);
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_unsubscribes_then_exits() {
        let (client, mut server) = spot(quiet());
        client.connect().await.unwrap();
        let mut session = server.accept().await.unwrap();

        client
            .subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), |_| {})
            .await
            .unwrap();
        client
            .subscribe(SpotTopic::kline("BTCUSDT", KlineInterval::Min1), |_| {})
            .await
            .unwrap();
        session.next_sent().await.unwrap();
        session.next_sent().await.unwrap();

        client.close().await;
        assert_eq!(
            session.next_sent().await.unwrap(),
            format!(r#"{{"method":"UNSUBSCRIPTION","params":["{}","{}"]}}"#, DEALS, KLINE)
        );
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(client.subscribed_topics().is_empty());

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, MexcError::ShuttingDown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scope_returns_value_and_closes() {
        let (client, mut server) = spot(quiet());

        let keys = client
            .scope(|c| {
                async move {
                    c.subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), |_| {})
                        .await
                        .unwrap();
                    c.subscribed_topics()
                }
                .boxed()
            })
            .await
            .unwrap();

        assert_eq!(keys, vec![DEALS]);
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(server.accept().await.is_some());
    }
}
