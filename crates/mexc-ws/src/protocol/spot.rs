//! Spot v3 stream protocol
//!
//! Channels are `@`-joined strings such as
//! `spot@public.aggre.deals.v3.api@100ms@BTCUSDT`. The composed string is both
//! the wire name and the registry key; inbound data carries it in `c` (JSON)
//! or `channel` (decoded protobuf).

use mexc_types::{
    DepthLevel, KlineInterval, MexcError, MexcResult, ProtocolVariant, Speed, Timezone, Visibility,
};
use serde::Serialize;
use serde_json::Value;

use super::{AckTarget, AuthMode, Inbound, Protocol, StreamKind, Topic};
use crate::endpoint::SPOT_WS_URL;

/// Topics allowed on one spot connection
pub const SPOT_MAX_TOPICS: usize = 30;

const PING: &str = r#"{"method":"PING"}"#;
const NACK_MARKER: &str = "Not Subscribed successfully";

/// Typed spot topics
///
/// Each variant lists its channel tokens in wire order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpotTopic {
    /// `public.aggre.deals` `@speed@SYMBOL`
    Deals { symbol: String, speed: Speed },
    /// `public.kline` `@SYMBOL@interval`
    Kline { symbol: String, interval: KlineInterval },
    /// `public.aggre.depth` `@speed@SYMBOL`
    Depth { symbol: String, speed: Speed },
    /// `public.limit.depth` `@SYMBOL@level`
    LimitDepth { symbol: String, level: DepthLevel },
    /// `public.aggre.bookTicker` `@speed@SYMBOL`
    BookTicker { symbol: String, speed: Speed },
    /// `public.bookTicker.batch` `@SYMBOL`
    BookTickerBatch { symbol: String },
    /// `public.miniTicker` `@SYMBOL@timezone`
    MiniTicker { symbol: String, timezone: Timezone },
    /// `public.miniTickers` `@timezone`
    MiniTickers { timezone: Timezone },
    /// `private.account`
    Account,
    /// `private.deals`
    AccountDeals,
    /// `private.orders`
    AccountOrders,
    /// A raw channel string sent verbatim
    Custom { channel: String },
}

impl SpotTopic {
    pub fn deals(symbol: impl Into<String>, speed: Speed) -> Self {
        Self::Deals {
            symbol: symbol.into(),
            speed,
        }
    }

    pub fn kline(symbol: impl Into<String>, interval: KlineInterval) -> Self {
        Self::Kline {
            symbol: symbol.into(),
            interval,
        }
    }

    pub fn depth(symbol: impl Into<String>, speed: Speed) -> Self {
        Self::Depth {
            symbol: symbol.into(),
            speed,
        }
    }

    pub fn limit_depth(symbol: impl Into<String>, level: DepthLevel) -> Self {
        Self::LimitDepth {
            symbol: symbol.into(),
            level,
        }
    }

    pub fn book_ticker(symbol: impl Into<String>, speed: Speed) -> Self {
        Self::BookTicker {
            symbol: symbol.into(),
            speed,
        }
    }

    pub fn book_ticker_batch(symbol: impl Into<String>) -> Self {
        Self::BookTickerBatch {
            symbol: symbol.into(),
        }
    }

    pub fn mini_ticker(symbol: impl Into<String>, timezone: Timezone) -> Self {
        Self::MiniTicker {
            symbol: symbol.into(),
            timezone,
        }
    }

    pub fn mini_tickers(timezone: Timezone) -> Self {
        Self::MiniTickers { timezone }
    }

    pub fn custom(channel: impl Into<String>) -> Self {
        Self::Custom {
            channel: channel.into(),
        }
    }

    fn symbol(&self) -> Option<&str> {
        match self {
            Self::Deals { symbol, .. }
            | Self::Kline { symbol, .. }
            | Self::Depth { symbol, .. }
            | Self::LimitDepth { symbol, .. }
            | Self::BookTicker { symbol, .. }
            | Self::BookTickerBatch { symbol }
            | Self::MiniTicker { symbol, .. } => Some(symbol),
            _ => None,
        }
    }

    /// Channel tokens after the `spot@<kind>.v3.api` prefix, in wire order
    fn tokens(&self) -> Vec<String> {
        match self {
            Self::Deals { symbol, speed }
            | Self::Depth { symbol, speed }
            | Self::BookTicker { symbol, speed } => vec![speed.to_string(), symbol.clone()],
            Self::Kline { symbol, interval } => vec![symbol.clone(), interval.to_string()],
            Self::LimitDepth { symbol, level } => vec![symbol.clone(), level.as_u32().to_string()],
            Self::BookTickerBatch { symbol } => vec![symbol.clone()],
            Self::MiniTicker { symbol, timezone } => vec![symbol.clone(), timezone.to_string()],
            Self::MiniTickers { timezone } => vec![timezone.to_string()],
            Self::Account | Self::AccountDeals | Self::AccountOrders | Self::Custom { .. } => {
                Vec::new()
            }
        }
    }
}

impl Topic for SpotTopic {
    fn kind(&self) -> &str {
        match self {
            Self::Deals { .. } => "public.aggre.deals",
            Self::Kline { .. } => "public.kline",
            Self::Depth { .. } => "public.aggre.depth",
            Self::LimitDepth { .. } => "public.limit.depth",
            Self::BookTicker { .. } => "public.aggre.bookTicker",
            Self::BookTickerBatch { .. } => "public.bookTicker.batch",
            Self::MiniTicker { .. } => "public.miniTicker",
            Self::MiniTickers { .. } => "public.miniTickers",
            Self::Account => "private.account",
            Self::AccountDeals => "private.deals",
            Self::AccountOrders => "private.orders",
            Self::Custom { .. } => "custom",
        }
    }

    fn visibility(&self) -> Visibility {
        match self {
            Self::Account | Self::AccountDeals | Self::AccountOrders => Visibility::Private,
            Self::Custom { channel } if channel.starts_with("spot@private.") => Visibility::Private,
            _ => Visibility::Public,
        }
    }
}

/// Spot convenience streams, for unsubscribing everything a wrapper subscribed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpotStream {
    Deals,
    Kline,
    Depth,
    LimitDepth,
    BookTicker,
    BookTickerBatch,
    MiniTicker,
    MiniTickers,
    AccountUpdate,
    AccountDeals,
    AccountOrders,
    Custom,
}

impl StreamKind for SpotStream {
    fn kind(&self) -> &'static str {
        match self {
            Self::Deals => "public.aggre.deals",
            Self::Kline => "public.kline",
            Self::Depth => "public.aggre.depth",
            Self::LimitDepth => "public.limit.depth",
            Self::BookTicker => "public.aggre.bookTicker",
            Self::BookTickerBatch => "public.bookTicker.batch",
            Self::MiniTicker => "public.miniTicker",
            Self::MiniTickers => "public.miniTickers",
            Self::AccountUpdate => "private.account",
            Self::AccountDeals => "private.deals",
            Self::AccountOrders => "private.orders",
            Self::Custom => "custom",
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    method: &'static str,
    params: &'a [String],
}

/// Spot protocol adapter
#[derive(Debug, Clone, Copy, Default)]
pub struct SpotProtocol {
    protobuf: bool,
}

impl SpotProtocol {
    /// JSON channels (the default)
    pub fn json() -> Self {
        Self { protobuf: false }
    }

    /// Protobuf channels (`.pb` suffix); binary frames need a caller decoder
    pub fn protobuf() -> Self {
        Self { protobuf: true }
    }

    /// Returns true in protobuf mode
    pub fn is_protobuf(&self) -> bool {
        self.protobuf
    }

    /// Compose the wire channel for a topic
    pub fn channel(&self, topic: &SpotTopic) -> String {
        if let SpotTopic::Custom { channel } = topic {
            return channel.clone();
        }

        let mut channel = format!(
            "spot@{}.v3.api{}",
            topic.kind(),
            if self.protobuf { ".pb" } else { "" }
        );
        for token in topic.tokens() {
            channel.push('@');
            channel.push_str(&token);
        }
        channel
    }

    fn envelope(&self, method: &'static str, topics: &[SpotTopic]) -> MexcResult<Vec<String>> {
        if topics.is_empty() {
            return Ok(Vec::new());
        }
        let channels: Vec<String> = topics.iter().map(|t| self.channel(t)).collect();
        let frame = serde_json::to_string(&Envelope {
            method,
            params: &channels,
        })?;
        Ok(vec![frame])
    }
}

/// Channels listed in a nack message: `... [a,b].  Reason: ...`
fn bracketed_channels(msg: &str) -> Vec<String> {
    let Some(start) = msg.find('[') else {
        return Vec::new();
    };
    let Some(len) = msg[start + 1..].find(']') else {
        return Vec::new();
    };
    msg[start + 1..start + 1 + len]
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

impl Protocol for SpotProtocol {
    type Topic = SpotTopic;
    type Stream = SpotStream;

    fn variant(&self) -> ProtocolVariant {
        ProtocolVariant::Spot
    }

    fn default_url(&self) -> &'static str {
        SPOT_WS_URL
    }

    fn auth_mode(&self) -> AuthMode {
        AuthMode::ListenKey
    }

    fn max_topics(&self) -> Option<usize> {
        Some(SPOT_MAX_TOPICS)
    }

    fn topic_key(&self, topic: &SpotTopic) -> String {
        self.channel(topic)
    }

    fn validate(&self, topic: &SpotTopic) -> MexcResult<()> {
        if let Some(symbol) = topic.symbol() {
            if symbol.is_empty() {
                return Err(MexcError::invalid_topic(topic.kind(), "symbol is empty"));
            }
            if symbol.contains('@') || symbol.chars().any(char::is_whitespace) {
                return Err(MexcError::invalid_topic(
                    topic.kind(),
                    format!("symbol {:?} contains '@' or whitespace", symbol),
                ));
            }
        }
        if let SpotTopic::Custom { channel } = topic {
            if !channel.starts_with("spot@") {
                return Err(MexcError::invalid_topic(
                    channel.as_str(),
                    "channel must start with 'spot@'",
                ));
            }
        }
        Ok(())
    }

    fn subscribe_frames(
        &self,
        topics: &[SpotTopic],
        _registered: &[SpotTopic],
    ) -> MexcResult<Vec<String>> {
        self.envelope("SUBSCRIPTION", topics)
    }

    fn unsubscribe_frames(
        &self,
        topics: &[SpotTopic],
        _remaining: &[SpotTopic],
    ) -> MexcResult<Vec<String>> {
        self.envelope("UNSUBSCRIPTION", topics)
    }

    fn ping_frame(&self) -> &'static str {
        PING
    }

    fn classify(&self, msg: Value) -> Inbound {
        if let Some(text) = msg.get("msg").and_then(Value::as_str) {
            let code = msg.get("code").and_then(Value::as_i64).unwrap_or(0);

            if text.eq_ignore_ascii_case("PONG") {
                return Inbound::Heartbeat;
            }
            if text.contains(NACK_MARKER) {
                let channels = bracketed_channels(text);
                let target = if channels.is_empty() {
                    AckTarget::OldestPending
                } else {
                    AckTarget::Keys(channels)
                };
                return Inbound::SubscribeNack {
                    target,
                    reason: text.to_string(),
                };
            }
            if code != 0 {
                return Inbound::SubscribeNack {
                    target: AckTarget::OldestPending,
                    reason: format!("code {}: {}", code, text),
                };
            }
            if msg.get("id").is_some() {
                let keys = text
                    .split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
                return Inbound::SubscribeAck {
                    target: AckTarget::Keys(keys),
                };
            }
        }

        let channel = msg
            .get("c")
            .or_else(|| msg.get("channel"))
            .and_then(Value::as_str)
            .map(str::to_string);

        match channel {
            Some(channel) => Inbound::Data {
                keys: vec![channel],
                payload: msg,
            },
            None => Inbound::Unknown { payload: msg },
        }
    }
}
