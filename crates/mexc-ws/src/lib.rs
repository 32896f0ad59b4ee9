//! Persistent WebSocket stream client for MEXC spot and futures
//!
//! One engine, [`StreamClient`], drives both protocols through the
//! [`Protocol`](protocol::Protocol) trait. It keeps a registry of topic
//! callbacks, reconnects with a retry budget, replays every subscription on
//! each new session, and keeps the connection alive with pings and (for
//! private spot streams) listen key renewal.
//!
//! # Features
//!
//! - Typed topics with ordered parameters ([`SpotTopic`], [`FuturesTopic`])
//! - Exactly-once subscription replay after reconnect
//! - Futures login frame and personal filters
//! - Observability [`Hooks`]
//!
//! # Example
//!
//! ```no_run
//! use mexc_ws::{ConnectionConfig, FuturesClient, FuturesProtocol};
//! use mexc_types::KlineInterval;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FuturesClient::builder(FuturesProtocol)
//!         .with_config(ConnectionConfig::new().with_retries(10))
//!         .build();
//!
//!     client.connect().await?;
//!     client
//!         .kline_stream("BTC_USDT", KlineInterval::Min1, |msg| {
//!             println!("{}", msg.payload);
//!         })
//!         .await?;
//!
//!     client.closed().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod connection;
pub mod endpoint;
pub mod futures;
pub mod hooks;
mod keepalive;
pub mod protocol;
pub mod reconnect;
mod router;
pub mod spot;
pub mod subscription;
pub mod transport;

// Re-export main types
pub use client::{StreamClient, StreamClientBuilder, Unsubscribe};
pub use codec::{FrameDecoder, JsonDecoder};
pub use connection::{ConnectionConfig, ConnectionState};
pub use endpoint::{Endpoint, FUTURES_WS_URL, SPOT_WS_URL};
pub use self::futures::FuturesClient;
pub use hooks::{ConnectInfo, DisconnectInfo, Hooks, SubscriptionInfo};
pub use protocol::{
    FuturesProtocol, FuturesStream, FuturesTopic, PersonalTopic, SpotProtocol, SpotStream,
    SpotTopic, SPOT_MAX_TOPICS,
};
pub use reconnect::ReconnectConfig;
pub use spot::SpotClient;
pub use subscription::{Callback, StreamMessage, SubscriptionStatus};
pub use transport::{Connector, Frame, Transport, TransportError, WsConnector, WsTransport};

#[cfg(any(test, feature = "test-utils"))]
pub use transport::{MockConnector, MockServer, MockSession};
