//! Spot convenience streams
//!
//! Each wrapper only builds typed topics and forwards to
//! [`StreamClient::subscribe`]. Wrappers taking several symbols subscribe
//! them in one envelope with a shared callback.

use crate::client::{StreamClient, Unsubscribe};
use crate::protocol::{SpotProtocol, SpotStream, SpotTopic};
use crate::subscription::StreamMessage;

use mexc_types::{DepthLevel, KlineInterval, MexcResult, Speed, Timezone};

/// Spot stream client
pub type SpotClient = StreamClient<SpotProtocol>;

impl From<SpotStream> for Unsubscribe<SpotStream> {
    fn from(stream: SpotStream) -> Self {
        Unsubscribe::Stream(stream)
    }
}

fn symbols<I, S>(symbols: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    symbols.into_iter().map(Into::into).collect()
}

impl StreamClient<SpotProtocol> {
    /// JSON spot client with default configuration
    pub fn new() -> Self {
        Self::builder(SpotProtocol::json()).build()
    }

    /// Trade streams
    pub async fn deals_stream<I, S, F>(&self, pairs: I, speed: Speed, callback: F) -> MexcResult<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        let topics = symbols(pairs)
            .into_iter()
            .map(|symbol| SpotTopic::deals(symbol, speed))
            .collect();
        self.subscribe_many(topics, callback).await
    }

    /// Candlesticks for one symbol
    pub async fn kline_stream<F>(
        &self,
        symbol: impl Into<String>,
        interval: KlineInterval,
        callback: F,
    ) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(SpotTopic::kline(symbol, interval), callback).await
    }

    /// Incremental depth
    pub async fn depth_stream<I, S, F>(&self, pairs: I, speed: Speed, callback: F) -> MexcResult<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        let topics = symbols(pairs)
            .into_iter()
            .map(|symbol| SpotTopic::depth(symbol, speed))
            .collect();
        self.subscribe_many(topics, callback).await
    }

    /// Partial book depth at a fixed level
    pub async fn limit_depth_stream<F>(
        &self,
        symbol: impl Into<String>,
        level: DepthLevel,
        callback: F,
    ) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(SpotTopic::limit_depth(symbol, level), callback).await
    }

    /// Best bid and ask
    pub async fn book_ticker_stream<I, S, F>(
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
        let topics = symbols(pairs)
            .into_iter()
            .map(|symbol| SpotTopic::book_ticker(symbol, speed))
            .collect();
        self.subscribe_many(topics, callback).await
    }

    /// Batched best bid and ask
    pub async fn book_ticker_batch_stream<I, S, F>(&self, pairs: I, callback: F) -> MexcResult<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        let topics = symbols(pairs)
            .into_iter()
            .map(SpotTopic::book_ticker_batch)
            .collect();
        self.subscribe_many(topics, callback).await
    }

    /// Mini ticker for one symbol
    pub async fn mini_ticker_stream<F>(
        &self,
        symbol: impl Into<String>,
        timezone: Timezone,
        callback: F,
    ) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(SpotTopic::mini_ticker(symbol, timezone), callback).await
    }

    /// Mini tickers for every symbol
    pub async fn mini_tickers_stream<F>(&self, timezone: Timezone, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(SpotTopic::mini_tickers(timezone), callback).await
    }

    /// Account balance updates (needs a listen key)
    pub async fn account_update<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(SpotTopic::Account, callback).await
    }

    /// Own trades (needs a listen key)
    pub async fn account_deals<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(SpotTopic::AccountDeals, callback).await
    }

    /// Own orders (needs a listen key)
    pub async fn account_orders<F>(&self, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(SpotTopic::AccountOrders, callback).await
    }

    /// Raw channel string, sent as given
    pub async fn custom_topic_stream<F>(&self, channel: impl Into<String>, callback: F) -> MexcResult<String>
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.subscribe(SpotTopic::custom(channel), callback).await
    }
}

impl Default for StreamClient<SpotProtocol> {
    fn default() -> Self {
        Self::new()
    }
}
