//! Blocking facade
//!
//! Each client owns a multi-thread tokio runtime. The engine's loops run on
//! its worker threads and callbacks fire there; the calling thread only
//! blocks for the duration of each method. Do not create or drop these
//! clients from inside an async context.
//!
//! ```no_run
//! use mexc_sdk::blocking::SpotClient;
//! use mexc_types::Speed;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SpotClient::new()?;
//!     client.connect()?;
//!     client.deals_stream(["BTCUSDT"], Speed::Ms100, |msg| {
//!         println!("{}", msg.payload);
//!     })?;
//!     client.closed()?;
//!     Ok(())
//! }
//! ```

use crate::builder::MexcClientBuilder;

use futures::future::BoxFuture;
use mexc_auth::ListenKey;
use mexc_types::{DepthLevel, KlineInterval, MexcError, MexcResult, Speed, Timezone};
use mexc_ws::protocol::Protocol;
use mexc_ws::{
    ConnectionState, FuturesProtocol, SpotProtocol, StreamClient, StreamClientBuilder,
    StreamMessage, SubscriptionStatus, Unsubscribe,
};
use serde_json::Value;
use std::future::Future;
use tokio::runtime::Runtime;
use tracing::debug;

/// Blocking spot client
pub type SpotClient = BlockingClient<SpotProtocol>;

/// Blocking futures client
pub type FuturesClient = BlockingClient<FuturesProtocol>;

/// Stream client driven by its own runtime
pub struct BlockingClient<P: Protocol> {
    // Dropped before the runtime so the shutdown signal reaches the loops first
    client: StreamClient<P>,
    runtime: Runtime,
}

impl<P: Protocol> BlockingClient<P> {
    /// Start a runtime and build the engine from `builder`
    pub fn with_builder(builder: StreamClientBuilder<P>) -> MexcResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("mexc-stream")
            .build()
            .map_err(|e| MexcError::Configuration(format!("runtime: {}", e)))?;

        let client = {
            let _guard = runtime.enter();
            builder.build()
        };
        debug!("blocking client runtime started");
        Ok(Self { client, runtime })
    }

    /// Run a future on the client's runtime
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// The async client behind this facade
    pub fn client(&self) -> &StreamClient<P> {
        &self.client
    }

    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    pub fn is_ready(&self) -> bool {
        self.client.is_ready()
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.is_authenticated()
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.client.subscribed_topics()
    }

    pub fn is_subscribed(&self, key: &str) -> bool {
        self.client.is_subscribed(key)
    }

    pub fn subscription_status(&self, key: &str) -> Option<SubscriptionStatus> {
        self.client.subscription_status(key)
    }

    pub fn listen_key(&self) -> Option<ListenKey> {
        self.client.listen_key()
    }

    /// Connect and block until the first session is ready
    pub fn connect(&self) -> MexcResult<()> {
        self.block_on(self.client.connect())
    }

    /// Block until the client is closed
    pub fn closed(&self) -> MexcResult<()> {
        self.block_on(self.client.closed())
    }

    pub fn subscribe<F>(&self, topic: P::Topic, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.subscribe(topic, callback))
    }

    pub fn subscribe_many<F>(&self, topics: Vec<P::Topic>, callback: F) -> MexcResult<Vec<String>>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.subscribe_many(topics, callback))
    }

    pub fn unsubscribe(&self, target: impl Into<Unsubscribe<P::Stream>>) -> MexcResult<Vec<String>> {
        self.client.unsubscribe(target)
    }

    pub fn unsubscribe_all(&self) -> MexcResult<Vec<String>> {
        self.client.unsubscribe_all()
    }

    /// Stop every loop and clear the registry
    pub fn exit(&self) {
        self.block_on(self.client.exit())
    }

    /// Unsubscribe everything (best effort), then exit
    pub fn close(&self) {
        self.block_on(self.client.close())
    }

    /// Connect, run `f`, and close on every exit path
    pub fn scope<F, T>(&self, f: F) -> MexcResult<T>
    where
        F: for<'a> FnOnce(&'a StreamClient<P>) -> BoxFuture<'a, T>,
    {
        self.block_on(self.client.scope(f))
    }
}

impl<P: Protocol> std::fmt::Debug for BlockingClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingClient")
            .field("client", &self.client)
            .finish()
    }
}

impl BlockingClient<SpotProtocol> {
    /// JSON spot client with default configuration
    pub fn new() -> MexcResult<Self> {
        Self::with_builder(StreamClient::builder(SpotProtocol::json()))
    }

    /// Spot client configured by `config`
    pub fn from_config(config: &MexcClientBuilder) -> MexcResult<Self> {
        Self::with_builder(config.spot_builder()?)
    }

    pub fn deals_stream<I, S, F>(&self, pairs: I, speed: Speed, callback: F) -> MexcResult<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.deals_stream(pairs, speed, callback))
    }

    pub fn kline_stream<F>(
        &self,
        symbol: impl Into<String>,
        interval: KlineInterval,
        callback: F,
    ) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.kline_stream(symbol, interval, callback))
    }

    pub fn depth_stream<I, S, F>(&self, pairs: I, speed: Speed, callback: F) -> MexcResult<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.depth_stream(pairs, speed, callback))
    }

    pub fn limit_depth_stream<F>(
        &self,
        symbol: impl Into<String>,
        level: DepthLevel,
        callback: F,
    ) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.limit_depth_stream(symbol, level, callback))
    }

    pub fn book_ticker_stream<I, S, F>(
        &self,
        pairs: I,
        speed: Speed,
        callback: F,
    ) -> MexcResult<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.book_ticker_stream(pairs, speed, callback))
    }

    pub fn book_ticker_batch_stream<I, S, F>(&self, pairs: I, callback: F) -> MexcResult<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.book_ticker_batch_stream(pairs, callback))
    }

    pub fn mini_ticker_stream<F>(
        &self,
        symbol: impl Into<String>,
        timezone: Timezone,
        callback: F,
    ) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.mini_ticker_stream(symbol, timezone, callback))
    }

    pub fn mini_tickers_stream<F>(&self, timezone: Timezone, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.mini_tickers_stream(timezone, callback))
    }

    pub fn account_update<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.account_update(callback))
    }

    pub fn account_deals<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.account_deals(callback))
    }

    pub fn account_orders<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.account_orders(callback))
    }

    pub fn custom_topic_stream<F>(&self, channel: impl Into<String>, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.custom_topic_stream(channel, callback))
    }
}

impl BlockingClient<FuturesProtocol> {
    /// Futures client with default configuration
    pub fn new() -> MexcResult<Self> {
        Self::with_builder(StreamClient::builder(FuturesProtocol))
    }

    /// Futures client configured by `config`
    pub fn from_config(config: &MexcClientBuilder) -> MexcResult<Self> {
        Self::with_builder(config.futures_builder()?)
    }

    pub fn tickers_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.tickers_stream(callback))
    }

    pub fn ticker_stream<F>(&self, symbol: impl Into<String>, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.ticker_stream(symbol, callback))
    }

    pub fn deal_stream<F>(&self, symbol: impl Into<String>, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.deal_stream(symbol, callback))
    }

    pub fn depth_stream<F>(&self, symbol: impl Into<String>, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.depth_stream(symbol, callback))
    }

    pub fn depth_full_stream<F>(
        &self,
        symbol: impl Into<String>,
        limit: DepthLevel,
        callback: F,
    ) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.depth_full_stream(symbol, limit, callback))
    }

    pub fn kline_stream<F>(
        &self,
        symbol: impl Into<String>,
        interval: KlineInterval,
        callback: F,
    ) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.kline_stream(symbol, interval, callback))
    }

    pub fn funding_rate_stream<F>(&self, symbol: impl Into<String>, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.funding_rate_stream(symbol, callback))
    }

    pub fn index_price_stream<F>(&self, symbol: impl Into<String>, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.index_price_stream(symbol, callback))
    }

    pub fn fair_price_stream<F>(&self, symbol: impl Into<String>, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.fair_price_stream(symbol, callback))
    }

    pub fn personal_stream<F>(&self, callback: F) -> MexcResult<Vec<String>>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.personal_stream(callback))
    }

    pub fn order_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.order_stream(callback))
    }

    pub fn order_deal_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.order_deal_stream(callback))
    }

    pub fn asset_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.asset_stream(callback))
    }

    pub fn position_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.position_stream(callback))
    }

    pub fn risk_limit_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.risk_limit_stream(callback))
    }

    pub fn adl_level_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.adl_level_stream(callback))
    }

    pub fn position_mode_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.position_mode_stream(callback))
    }

    pub fn custom_topic_stream<F>(
        &self,
        kind: impl Into<String>,
        param: Value,
        callback: F,
    ) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.block_on(self.client.custom_topic_stream(kind, param, callback))
    }
}
