//! Futures (contract) stream protocol
//!
//! Topics are bare kinds with parameters in a separate `param` object.
//! Private data needs a signed login frame, after which personal pushes are
//! narrowed with a single `personal.filter` listing every wanted filter.

use mexc_auth::Credentials;
use mexc_types::{
    DepthLevel, KlineInterval, MexcError, MexcResult, ProtocolVariant, Visibility,
};
use serde::Serialize;
use serde_json::Value;

use super::{AckTarget, AuthMode, Inbound, Protocol, StreamKind, Topic};
use crate::endpoint::FUTURES_WS_URL;

const PING: &str = r#"{"method":"ping"}"#;
const PERSONAL_PREFIX: &str = "personal.";

/// Personal (private) push filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersonalTopic {
    Order,
    OrderDeal,
    Position,
    PlanOrder,
    StopOrder,
    StopPlanOrder,
    RiskLimit,
    AdlLevel,
    Asset,
    LiquidateRisk,
    PositionMode,
}

impl PersonalTopic {
    pub const ALL: [PersonalTopic; 11] = [
        Self::Order,
        Self::OrderDeal,
        Self::Position,
        Self::PlanOrder,
        Self::StopOrder,
        Self::StopPlanOrder,
        Self::RiskLimit,
        Self::AdlLevel,
        Self::Asset,
        Self::LiquidateRisk,
        Self::PositionMode,
    ];

    /// Filter name used in `personal.filter`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::OrderDeal => "order.deal",
            Self::Position => "position",
            Self::PlanOrder => "plan.order",
            Self::StopOrder => "stop.order",
            Self::StopPlanOrder => "stop.planorder",
            Self::RiskLimit => "risk.limit",
            Self::AdlLevel => "adl.level",
            Self::Asset => "asset",
            Self::LiquidateRisk => "liquidate.risk",
            Self::PositionMode => "position.mode",
        }
    }

    /// Topic kind, `personal.<filter>`
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Order => "personal.order",
            Self::OrderDeal => "personal.order.deal",
            Self::Position => "personal.position",
            Self::PlanOrder => "personal.plan.order",
            Self::StopOrder => "personal.stop.order",
            Self::StopPlanOrder => "personal.stop.planorder",
            Self::RiskLimit => "personal.risk.limit",
            Self::AdlLevel => "personal.adl.level",
            Self::Asset => "personal.asset",
            Self::LiquidateRisk => "personal.liquidate.risk",
            Self::PositionMode => "personal.position.mode",
        }
    }
}

/// Typed futures topics
#[derive(Debug, Clone, PartialEq)]
pub enum FuturesTopic {
    Tickers,
    Ticker { symbol: String },
    Deal { symbol: String },
    Depth { symbol: String },
    DepthFull { symbol: String, limit: DepthLevel },
    Kline { symbol: String, interval: KlineInterval },
    FundingRate { symbol: String },
    IndexPrice { symbol: String },
    FairPrice { symbol: String },
    Personal(PersonalTopic),
    /// Raw kind with a caller-built `param` object
    Custom { kind: String, param: Value },
}

impl FuturesTopic {
    pub fn ticker(symbol: impl Into<String>) -> Self {
        Self::Ticker {
            symbol: symbol.into(),
        }
    }

    pub fn deal(symbol: impl Into<String>) -> Self {
        Self::Deal {
            symbol: symbol.into(),
        }
    }

    pub fn depth(symbol: impl Into<String>) -> Self {
        Self::Depth {
            symbol: symbol.into(),
        }
    }

    pub fn depth_full(symbol: impl Into<String>, limit: DepthLevel) -> Self {
        Self::DepthFull {
            symbol: symbol.into(),
            limit,
        }
    }

    pub fn kline(symbol: impl Into<String>, interval: KlineInterval) -> Self {
        Self::Kline {
            symbol: symbol.into(),
            interval,
        }
    }

    pub fn funding_rate(symbol: impl Into<String>) -> Self {
        Self::FundingRate {
            symbol: symbol.into(),
        }
    }

    pub fn index_price(symbol: impl Into<String>) -> Self {
        Self::IndexPrice {
            symbol: symbol.into(),
        }
    }

    pub fn fair_price(symbol: impl Into<String>) -> Self {
        Self::FairPrice {
            symbol: symbol.into(),
        }
    }

    pub fn custom(kind: impl Into<String>, param: Value) -> Self {
        Self::Custom {
            kind: kind.into(),
            param,
        }
    }

    /// Symbol carried by this topic, if any
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Ticker { symbol }
            | Self::Deal { symbol }
            | Self::Depth { symbol }
            | Self::DepthFull { symbol, .. }
            | Self::Kline { symbol, .. }
            | Self::FundingRate { symbol }
            | Self::IndexPrice { symbol }
            | Self::FairPrice { symbol } => Some(symbol),
            Self::Custom { param, .. } => param.get("symbol").and_then(Value::as_str),
            Self::Tickers | Self::Personal(_) => None,
        }
    }

    /// Registry key: `kind`, `kind:SYMBOL`, or `kline:SYMBOL:interval`
    pub fn key(&self) -> String {
        match (self, self.symbol()) {
            (Self::Kline { symbol, interval }, _) => format!("kline:{}:{}", symbol, interval),
            (_, Some(symbol)) => format!("{}:{}", self.kind(), symbol),
            (_, None) => self.kind().to_string(),
        }
    }

    fn personal(&self) -> Option<PersonalTopic> {
        match self {
            Self::Personal(p) => Some(*p),
            _ => None,
        }
    }
}

impl Topic for FuturesTopic {
    fn kind(&self) -> &str {
        match self {
            Self::Tickers => "tickers",
            Self::Ticker { .. } => "ticker",
            Self::Deal { .. } => "deal",
            Self::Depth { .. } => "depth",
            Self::DepthFull { .. } => "depth.full",
            Self::Kline { .. } => "kline",
            Self::FundingRate { .. } => "funding.rate",
            Self::IndexPrice { .. } => "index.price",
            Self::FairPrice { .. } => "fair.price",
            Self::Personal(p) => p.kind(),
            Self::Custom { kind, .. } => kind,
        }
    }

    fn visibility(&self) -> Visibility {
        match self {
            Self::Personal(_) => Visibility::Private,
            _ => Visibility::Public,
        }
    }
}

/// Futures convenience streams, for unsubscribing everything a wrapper subscribed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuturesStream {
    Tickers,
    Ticker,
    Deal,
    Depth,
    DepthFull,
    Kline,
    FundingRate,
    IndexPrice,
    FairPrice,
    /// Every personal filter
    Personal,
    Order,
    OrderDeal,
    Asset,
    Position,
    RiskLimit,
    AdlLevel,
    PositionMode,
}

impl StreamKind for FuturesStream {
    fn kind(&self) -> &'static str {
        match self {
            Self::Tickers => "tickers",
            Self::Ticker => "ticker",
            Self::Deal => "deal",
            Self::Depth => "depth",
            Self::DepthFull => "depth.full",
            Self::Kline => "kline",
            Self::FundingRate => "funding.rate",
            Self::IndexPrice => "index.price",
            Self::FairPrice => "fair.price",
            Self::Personal => PERSONAL_PREFIX,
            Self::Order => PersonalTopic::Order.kind(),
            Self::OrderDeal => PersonalTopic::OrderDeal.kind(),
            Self::Asset => PersonalTopic::Asset.kind(),
            Self::Position => PersonalTopic::Position.kind(),
            Self::RiskLimit => PersonalTopic::RiskLimit.kind(),
            Self::AdlLevel => PersonalTopic::AdlLevel.kind(),
            Self::PositionMode => PersonalTopic::PositionMode.kind(),
        }
    }
}

#[derive(Serialize)]
struct Request<'a, P: Serialize> {
    method: String,
    param: &'a P,
}

#[derive(Serialize)]
struct SymbolParam<'a> {
    symbol: &'a str,
}

#[derive(Serialize)]
struct DepthFullParam<'a> {
    symbol: &'a str,
    limit: u32,
}

#[derive(Serialize)]
struct KlineParam<'a> {
    symbol: &'a str,
    interval: &'static str,
}

#[derive(Serialize)]
struct Empty {}

#[derive(Serialize)]
struct Filter {
    filter: &'static str,
}

#[derive(Serialize)]
struct FilterParam {
    filters: Vec<Filter>,
}

#[derive(Serialize)]
struct LoginParam<'a> {
    #[serde(rename = "apiKey")]
    api_key: &'a str,
    #[serde(rename = "reqTime")]
    req_time: String,
    signature: String,
}

#[derive(Serialize)]
struct Login<'a> {
    subscribe: bool,
    method: &'static str,
    param: LoginParam<'a>,
}

fn request<P: Serialize>(method: String, param: &P) -> MexcResult<String> {
    Ok(serde_json::to_string(&Request { method, param })?)
}

/// Futures protocol adapter
#[derive(Debug, Clone, Copy, Default)]
pub struct FuturesProtocol;

impl FuturesProtocol {
    fn sub_frame(&self, topic: &FuturesTopic) -> MexcResult<String> {
        let method = format!("sub.{}", topic.kind());
        match topic {
            FuturesTopic::Tickers => request(method, &Empty {}),
            FuturesTopic::DepthFull { symbol, limit } => request(
                method,
                &DepthFullParam {
                    symbol,
                    limit: limit.as_u32(),
                },
            ),
            FuturesTopic::Kline { symbol, interval } => request(
                method,
                &KlineParam {
                    symbol,
                    interval: interval.as_str(),
                },
            ),
            FuturesTopic::Custom { param, .. } => request(method, param),
            other => match other.symbol() {
                Some(symbol) => request(method, &SymbolParam { symbol }),
                None => request(method, &Empty {}),
            },
        }
    }

    fn unsub_frame(&self, topic: &FuturesTopic) -> MexcResult<String> {
        let method = format!("unsub.{}", topic.kind());
        match topic {
            FuturesTopic::Custom { param, .. } => request(method, param),
            other => match other.symbol() {
                Some(symbol) => request(method, &SymbolParam { symbol }),
                None => request(method, &Empty {}),
            },
        }
    }

    fn filter_frame(&self, topics: &[FuturesTopic]) -> MexcResult<String> {
        let mut filters: Vec<Filter> = Vec::new();
        for personal in topics.iter().filter_map(FuturesTopic::personal) {
            if !filters.iter().any(|f| f.filter == personal.as_str()) {
                filters.push(Filter {
                    filter: personal.as_str(),
                });
            }
        }
        request("personal.filter".to_string(), &FilterParam { filters })
    }
}

fn validate_symbol(kind: &str, symbol: &str) -> MexcResult<()> {
    if symbol.is_empty() {
        return Err(MexcError::invalid_topic(kind, "symbol is empty"));
    }
    if symbol.chars().any(char::is_whitespace) {
        return Err(MexcError::invalid_topic(
            kind,
            format!("symbol {:?} contains whitespace", symbol),
        ));
    }
    Ok(())
}

/// One kline interval per symbol
///
/// `unsub.kline` carries only the symbol, so the server cannot tell two
/// intervals of the same symbol apart when one is dropped.
fn check_kline_intervals(registered: &[FuturesTopic]) -> MexcResult<()> {
    let mut seen: Vec<(&str, KlineInterval)> = Vec::new();
    for topic in registered {
        if let FuturesTopic::Kline { symbol, interval } = topic {
            match seen.iter().find(|(s, _)| *s == symbol.as_str()) {
                Some((_, existing)) if existing != interval => {
                    return Err(MexcError::invalid_topic(
                        "kline",
                        format!(
                            "{} already streams {} klines; unsubscribe it before switching to {}",
                            symbol, existing, interval
                        ),
                    ));
                }
                Some(_) => {}
                None => seen.push((symbol.as_str(), *interval)),
            }
        }
    }
    Ok(())
}

/// Symbol of a push frame: top level first, then inside `data`
fn push_symbol(msg: &Value) -> Option<&str> {
    msg.get("symbol")
        .and_then(Value::as_str)
        .or_else(|| msg.get("data")?.get("symbol")?.as_str())
}

fn data_text(msg: &Value) -> String {
    match msg.get("data") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

impl Protocol for FuturesProtocol {
    type Topic = FuturesTopic;
    type Stream = FuturesStream;

    fn variant(&self) -> ProtocolVariant {
        ProtocolVariant::Futures
    }

    fn default_url(&self) -> &'static str {
        FUTURES_WS_URL
    }

    fn auth_mode(&self) -> AuthMode {
        AuthMode::LoginFrame
    }

    fn topic_key(&self, topic: &FuturesTopic) -> String {
        topic.key()
    }

    fn validate(&self, topic: &FuturesTopic) -> MexcResult<()> {
        if let FuturesTopic::Custom { kind, param } = topic {
            if kind.is_empty() || kind.chars().any(char::is_whitespace) {
                return Err(MexcError::invalid_topic(
                    kind.as_str(),
                    "kind must be non-empty without whitespace",
                ));
            }
            if kind.starts_with("sub.") || kind.starts_with(PERSONAL_PREFIX) {
                return Err(MexcError::invalid_topic(
                    kind.as_str(),
                    "pass the bare kind; personal data uses the personal topics",
                ));
            }
            if !param.is_object() {
                return Err(MexcError::invalid_topic(
                    kind.as_str(),
                    "param must be a JSON object",
                ));
            }
        }
        match topic.symbol() {
            Some(symbol) => validate_symbol(topic.kind(), symbol),
            None => Ok(()),
        }
    }

    fn subscribe_frames(
        &self,
        topics: &[FuturesTopic],
        registered: &[FuturesTopic],
    ) -> MexcResult<Vec<String>> {
        check_kline_intervals(registered)?;

        let mut frames = Vec::with_capacity(topics.len());
        for topic in topics.iter().filter(|t| t.personal().is_none()) {
            frames.push(self.sub_frame(topic)?);
        }
        if topics.iter().any(|t| t.personal().is_some()) {
            frames.push(self.filter_frame(registered)?);
        }
        Ok(frames)
    }

    fn unsubscribe_frames(
        &self,
        topics: &[FuturesTopic],
        remaining: &[FuturesTopic],
    ) -> MexcResult<Vec<String>> {
        let mut frames = Vec::with_capacity(topics.len());
        for topic in topics.iter().filter(|t| t.personal().is_none()) {
            frames.push(self.unsub_frame(topic)?);
        }
        if topics.iter().any(|t| t.personal().is_some())
            && remaining.iter().any(|t| t.personal().is_some())
        {
            frames.push(self.filter_frame(remaining)?);
        }
        Ok(frames)
    }

    fn ping_frame(&self) -> &'static str {
        PING
    }

    fn login_frame(&self, credentials: &Credentials, req_time: u64) -> MexcResult<Option<String>> {
        let login = Login {
            subscribe: false,
            method: "login",
            param: LoginParam {
                api_key: credentials.api_key(),
                req_time: req_time.to_string(),
                signature: credentials.login_signature(req_time)?,
            },
        };
        Ok(Some(serde_json::to_string(&login)?))
    }

    fn classify(&self, msg: Value) -> Inbound {
        let Some(channel) = msg.get("channel").and_then(Value::as_str).map(str::to_string) else {
            return Inbound::Unknown { payload: msg };
        };

        if channel == "pong" || channel == "clientId" {
            return Inbound::Heartbeat;
        }

        if channel == "rs.login" {
            let detail = data_text(&msg);
            return Inbound::AuthAck {
                success: detail == "success",
                detail,
            };
        }

        if channel == "rs.error" {
            return Inbound::ServerError {
                reason: data_text(&msg),
            };
        }

        if let Some(rest) = channel.strip_prefix("rs.") {
            let detail = data_text(&msg);
            if rest.starts_with("unsub.") {
                return Inbound::UnsubscribeAck { detail };
            }
            let target = if rest == "personal.filter" {
                AckTarget::KindPrefix(PERSONAL_PREFIX.to_string())
            } else if let Some(kind) = rest.strip_prefix("sub.") {
                AckTarget::OldestOfKind(kind.to_string())
            } else {
                return Inbound::Unknown { payload: msg };
            };
            return if detail == "success" {
                Inbound::SubscribeAck { target }
            } else {
                Inbound::SubscribeNack {
                    target,
                    reason: detail,
                }
            };
        }

        if let Some(kind) = channel.strip_prefix("push.") {
            let mut keys = Vec::with_capacity(3);
            if !kind.starts_with(PERSONAL_PREFIX) {
                if let Some(symbol) = push_symbol(&msg) {
                    if kind == "kline" {
                        if let Some(interval) = msg
                            .get("data")
                            .and_then(|d| d.get("interval"))
                            .and_then(Value::as_str)
                        {
                            keys.push(format!("kline:{}:{}", symbol, interval));
                        }
                    }
                    keys.push(format!("{}:{}", kind, symbol));
                }
            }
            keys.push(kind.to_string());
            return Inbound::Data { keys, payload: msg };
        }

        Inbound::Unknown { payload: msg }
    }
}
