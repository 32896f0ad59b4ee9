//! High-level SDK for MEXC spot and futures WebSocket streams
//!
//! This crate wraps the `mexc-ws` engine with an environment-aware builder
//! and a blocking facade for callers without an async runtime.
//!
//! # Quick Start
//!
//! ```no_run
//! use mexc_sdk::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     tracing_subscriber::fmt::init();
//!
//!     // Credentials come from MEXC_API_KEY / MEXC_API_SECRET
//!     let client = MexcClientBuilder::from_env()
//!         .with_retries(10)
//!         .connect_futures()
//!         .await?;
//!
//!     client.kline_stream("BTC_USDT", KlineInterval::Min1, |msg| {
//!         println!("{}", msg.payload);
//!     }).await?;
//!     client.position_stream(|msg| println!("{}", msg.payload)).await?;
//!
//!     client.closed().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - **Builder**: validated settings, credentials from the environment
//! - **Automatic Reconnection**: retry budget with subscription replay
//! - **Blocking API**: [`blocking::SpotClient`] and [`blocking::FuturesClient`]

pub mod blocking;
pub mod builder;
pub mod prelude;

// Re-export main types
pub use builder::{ConfigError, MexcClientBuilder};
pub use mexc_ws::{FuturesClient, SpotClient};

// Re-export commonly used types from dependencies
pub use mexc_auth::{Credentials, ListenKey};
pub use mexc_types::{MexcError, MexcResult};
pub use mexc_ws::{ConnectionState, Endpoint, Hooks, ReconnectConfig};
