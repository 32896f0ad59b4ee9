//! Futures convenience streams
//!
//! Personal streams need credentials on the client. Each personal wrapper
//! adds its filter to the single `personal.filter` the connection keeps.

use crate::client::{StreamClient, Unsubscribe};
use crate::protocol::{FuturesProtocol, FuturesStream, FuturesTopic, PersonalTopic};
use crate::subscription::StreamMessage;

use mexc_types::{DepthLevel, KlineInterval, MexcResult};
use serde_json::Value;

/// Futures stream client
pub type FuturesClient = StreamClient<FuturesProtocol>;

impl From<FuturesStream> for Unsubscribe<FuturesStream> {
    fn from(stream: FuturesStream) -> Self {
        Unsubscribe::Stream(stream)
    }
}

impl StreamClient<FuturesProtocol> {
    /// Futures client with default configuration
    pub fn new() -> Self {
        Self::builder(FuturesProtocol).build()
    }

    /// Every contract's ticker, once a second
    pub async fn tickers_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(FuturesTopic::Tickers, callback).await
    }

    pub async fn ticker_stream<F>(&self, symbol: impl Into<String>, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(FuturesTopic::ticker(symbol), callback).await
    }

    pub async fn deal_stream<F>(&self, symbol: impl Into<String>, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(FuturesTopic::deal(symbol), callback).await
    }

    /// Incremental depth
    pub async fn depth_stream<F>(&self, symbol: impl Into<String>, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(FuturesTopic::depth(symbol), callback).await
    }

    /// Full depth snapshot at a fixed level
    pub async fn depth_full_stream<F>(
        &self,
        symbol: impl Into<String>,
        limit: DepthLevel,
        callback: F,
    ) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(FuturesTopic::depth_full(symbol, limit), callback).await
    }

    /// Klines for one symbol
    ///
    /// A symbol streams one interval at a time; a second interval fails with
    /// `InvalidTopic` until the first is unsubscribed.
    pub async fn kline_stream<F>(
        &self,
        symbol: impl Into<String>,
        interval: KlineInterval,
        callback: F,
    ) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(FuturesTopic::kline(symbol, interval), callback).await
    }

    pub async fn funding_rate_stream<F>(&self, symbol: impl Into<String>, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(FuturesTopic::funding_rate(symbol), callback).await
    }

    pub async fn index_price_stream<F>(&self, symbol: impl Into<String>, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(FuturesTopic::index_price(symbol), callback).await
    }

    pub async fn fair_price_stream<F>(&self, symbol: impl Into<String>, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(FuturesTopic::fair_price(symbol), callback).await
    }

    /// Every personal filter with one callback
    pub async fn personal_stream<F>(&self, callback: F) -> MexcResult<Vec<String>>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        let topics = PersonalTopic::ALL
            .iter()
            .copied()
            .map(FuturesTopic::Personal)
            .collect();
        self.subscribe_many(topics, callback).await
    }

    async fn personal<F>(&self, topic: PersonalTopic, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(FuturesTopic::Personal(topic), callback).await
    }

    pub async fn order_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.personal(PersonalTopic::Order, callback).await
    }

    pub async fn order_deal_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.personal(PersonalTopic::OrderDeal, callback).await
    }

    pub async fn asset_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.personal(PersonalTopic::Asset, callback).await
    }

    pub async fn position_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.personal(PersonalTopic::Position, callback).await
    }

    pub async fn risk_limit_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.personal(PersonalTopic::RiskLimit, callback).await
    }

    pub async fn adl_level_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.personal(PersonalTopic::AdlLevel, callback).await
    }

    pub async fn position_mode_stream<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.personal(PersonalTopic::PositionMode, callback).await
    }

    /// Raw kind with a caller-built `param` object, e.g. `event.contract`
    pub async fn custom_topic_stream<F>(
        &self,
        kind: impl Into<String>,
        param: Value,
        callback: F,
    ) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(FuturesTopic::custom(kind, param), callback).await
    }
}

impl Default for StreamClient<FuturesProtocol> {
    fn default() -> Self {
        Self::new()
    }
}
