//! WebSocket transport abstraction
//!
//! The engine never touches `tokio-tungstenite` directly. A [`Connector`]
//! opens a [`Transport`] for a URL, and the session loop drives it. Tests swap
//! in [`MockConnector`] to script server behavior without a network.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use mexc_ws::transport::{Connector, TransportError, WsConnector};
//!
//! async fn example() -> Result<(), TransportError> {
//!     let mut transport = WsConnector
//!         .connect("wss://contract.mexc.com/edge", Duration::from_secs(60))
//!         .await?;
//!     transport.send(r#"{"method":"ping"}"#).await?;
//!     if let Some(frame) = transport.recv().await? {
//!         println!("Received {} bytes", frame.len());
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use mexc_types::MexcError;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};

/// A data frame received from the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame (JSON)
    Text(String),
    /// Binary frame (protobuf when the spot stream runs in `.pb` mode)
    Binary(Vec<u8>),
}

impl Frame {
    /// Payload size in bytes
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Returns true for an empty payload
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transport layer errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout
    #[error("connection timeout after {0:?}")]
    Timeout(Duration),

    /// Not connected
    #[error("not connected")]
    NotConnected,
}

impl TransportError {
    /// Convert into the crate error, attaching the URL for connect failures
    pub fn into_error(self, url: &str) -> MexcError {
        match self {
            Self::ConnectionFailed(reason) => MexcError::ConnectionFailed {
                url: url.to_string(),
                reason,
            },
            Self::Timeout(timeout) => MexcError::ConnectionTimeout {
                url: url.to_string(),
                timeout,
            },
            other => MexcError::WebSocket(other.to_string()),
        }
    }
}

impl From<TransportError> for MexcError {
    fn from(err: TransportError) -> Self {
        MexcError::WebSocket(err.to_string())
    }
}

/// An open WebSocket session
#[async_trait]
pub trait Transport: Send {
    /// Send a text message
    async fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Receive the next data frame
    ///
    /// Returns `None` if the connection was closed gracefully. Must be
    /// cancel safe: the session loop polls it inside `select!`.
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError>;

    /// Close the connection gracefully
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Get the endpoint URL
    fn endpoint(&self) -> &str;
}

/// Opens transports; one call per connection attempt
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a session to `url`, failing after `timeout`
    async fn connect(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// Connector using tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    #[instrument(skip(self, url), fields(url = %crate::endpoint::redact(url)))]
    async fn connect(
        &self,
        url: &str,
        connect_timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError> {
        debug!("Connecting to WebSocket");

        let (stream, _response) = timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout(connect_timeout))?
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket connected");
        Ok(Box::new(WsTransport {
            url: url.to_string(),
            stream: Some(stream),
        }))
    }
}

/// Real WebSocket transport using tokio-tungstenite
pub struct WsTransport {
    url: String,
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

#[async_trait]
impl Transport for WsTransport {
    #[instrument(skip(self, message), fields(len = message.len()))]
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        stream
            .send(Message::Text(message.to_string()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(Frame::Text(text))),
                Some(Ok(Message::Binary(data))) => return Ok(Some(Frame::Binary(data))),
                Some(Ok(Message::Close(_))) => {
                    self.stream = None;
                    return Ok(None);
                }
                // tungstenite answers pings itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Frame(_))) => continue,
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                None => {
                    self.stream = None;
                    return Err(TransportError::ConnectionClosed);
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            stream
                .close(None)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockConnector, MockServer, MockSession};

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    type ScriptedFrame = Result<Option<Frame>, TransportError>;

    #[derive(Default)]
    struct Script {
        /// Front entries decide the next attempts: `true` = refuse
        outcomes: VecDeque<bool>,
        refuse_all: bool,
        attempts: Vec<(String, Instant)>,
    }

    /// Mock connector for testing
    ///
    /// Every accepted connection is handed to the paired [`MockServer`] as a
    /// [`MockSession`], through which the test injects frames and reads what
    /// the client sent.
    #[derive(Clone)]
    pub struct MockConnector {
        script: Arc<Mutex<Script>>,
        sessions: mpsc::UnboundedSender<MockSession>,
    }

    /// Test side of a [`MockConnector`]
    pub struct MockServer {
        script: Arc<Mutex<Script>>,
        sessions: mpsc::UnboundedReceiver<MockSession>,
    }

    impl MockConnector {
        /// Create a connector and its server handle
        pub fn new() -> (Self, MockServer) {
            let script = Arc::new(Mutex::new(Script::default()));
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Self {
                    script: script.clone(),
                    sessions: tx,
                },
                MockServer {
                    script,
                    sessions: rx,
                },
            )
        }
    }

    impl MockServer {
        /// Refuse the next `n` connection attempts
        pub fn refuse_next(&self, n: usize) {
            let mut script = self.script.lock();
            for _ in 0..n {
                script.outcomes.push_back(true);
            }
        }

        /// Refuse every connection attempt
        pub fn refuse_all(&self) {
            self.script.lock().refuse_all = true;
        }

        /// URLs and instants of every connection attempt so far
        pub fn attempts(&self) -> Vec<(String, Instant)> {
            self.script.lock().attempts.clone()
        }

        /// Wait for the next accepted session
        pub async fn accept(&mut self) -> Option<MockSession> {
            self.sessions.recv().await
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(
            &self,
            url: &str,
            _timeout: Duration,
        ) -> Result<Box<dyn Transport>, TransportError> {
            let refuse = {
                let mut script = self.script.lock();
                script.attempts.push((url.to_string(), Instant::now()));
                let scripted = script.outcomes.pop_front().unwrap_or(false);
                scripted || script.refuse_all
            };
            if refuse {
                return Err(TransportError::ConnectionFailed(
                    "mock connection refused".into(),
                ));
            }

            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            let (sent_tx, sent_rx) = mpsc::unbounded_channel();
            let fail_send = Arc::new(AtomicBool::new(false));

            let session = MockSession {
                url: url.to_string(),
                inbound: inbound_tx,
                sent: sent_rx,
                fail_send: fail_send.clone(),
            };
            // The server handle may already be gone at the end of a test
            let _ = self.sessions.send(session);

            Ok(Box::new(MockTransport {
                url: url.to_string(),
                inbound: inbound_rx,
                sent: sent_tx,
                fail_send,
                connected: true,
            }))
        }
    }

    /// Server side of one mock connection
    pub struct MockSession {
        url: String,
        inbound: mpsc::UnboundedSender<ScriptedFrame>,
        sent: mpsc::UnboundedReceiver<String>,
        fail_send: Arc<AtomicBool>,
    }

    impl MockSession {
        /// URL the client connected to
        pub fn url(&self) -> &str {
            &self.url
        }

        /// Deliver a text frame to the client
        pub fn push_text(&self, text: impl Into<String>) {
            let _ = self.inbound.send(Ok(Some(Frame::Text(text.into()))));
        }

        /// Deliver a binary frame to the client
        pub fn push_binary(&self, data: Vec<u8>) {
            let _ = self.inbound.send(Ok(Some(Frame::Binary(data))));
        }

        /// Simulate a graceful close by the server
        pub fn push_close(&self) {
            let _ = self.inbound.send(Ok(None));
        }

        /// Simulate a receive error
        pub fn push_error(&self, error: TransportError) {
            let _ = self.inbound.send(Err(error));
        }

        /// Make every further client send fail
        pub fn fail_sends(&self) {
            self.fail_send.store(true, Ordering::SeqCst);
        }

        /// Wait for the next message the client sent
        ///
        /// Returns `None` once the client dropped the connection.
        pub async fn next_sent(&mut self) -> Option<String> {
            self.sent.recv().await
        }

        /// Drain messages the client has sent so far
        pub fn take_sent(&mut self) -> Vec<String> {
            let mut out = Vec::new();
            while let Ok(msg) = self.sent.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    struct MockTransport {
        url: String,
        inbound: mpsc::UnboundedReceiver<ScriptedFrame>,
        sent: mpsc::UnboundedSender<String>,
        fail_send: Arc<AtomicBool>,
        connected: bool,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: &str) -> Result<(), TransportError> {
            if !self.connected {
                return Err(TransportError::NotConnected);
            }
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(TransportError::SendFailed("mock send failure".into()));
            }
            let _ = self.sent.send(message.to_string());
            Ok(())
        }

        async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
            if !self.connected {
                return Err(TransportError::NotConnected);
            }
            match self.inbound.recv().await {
                Some(Ok(None)) => {
                    self.connected = false;
                    Ok(None)
                }
                Some(other) => other,
                None => Err(TransportError::ConnectionClosed),
            }
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.connected = false;
            Ok(())
        }

        fn endpoint(&self) -> &str {
            &self.url
        }
    }
}
