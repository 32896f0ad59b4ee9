//! Protocol, visibility, and topic parameter enums

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MexcError;

/// Wire protocol family used by a stream client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// Spot v3 streams (`SUBSCRIPTION` envelopes, listen key auth)
    Spot,
    /// Futures contract streams (`sub.<topic>` envelopes, login frame auth)
    Futures,
}

impl ProtocolVariant {
    /// Returns the variant name as used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Futures => "futures",
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a topic needs an authenticated connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Market data, no credentials required
    Public,
    /// Account data, requires a listen key (spot) or login (futures)
    Private,
}

impl Visibility {
    /// Returns true for private topics
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private)
    }
}

/// Push speed for aggregated spot streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Speed {
    /// Push every 10 milliseconds
    #[serde(rename = "10ms")]
    Ms10,
    /// Push every 100 milliseconds
    #[serde(rename = "100ms")]
    #[default]
    Ms100,
}

impl Speed {
    /// Returns the speed token used in channel names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ms10 => "10ms",
            Self::Ms100 => "100ms",
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kline (candlestick) interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum KlineInterval {
    #[default]
    Min1,
    Min5,
    Min15,
    Min30,
    Min60,
    Hour4,
    Hour8,
    Day1,
    Week1,
    Month1,
}

impl KlineInterval {
    /// Returns the interval token used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Min1 => "Min1",
            Self::Min5 => "Min5",
            Self::Min15 => "Min15",
            Self::Min30 => "Min30",
            Self::Min60 => "Min60",
            Self::Hour4 => "Hour4",
            Self::Hour8 => "Hour8",
            Self::Day1 => "Day1",
            Self::Week1 => "Week1",
            Self::Month1 => "Month1",
        }
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of price levels for partial depth streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DepthLevel {
    /// 5 levels per side
    #[serde(rename = "5")]
    L5 = 5,
    /// 10 levels per side
    #[serde(rename = "10")]
    L10 = 10,
    /// 20 levels per side
    #[serde(rename = "20")]
    #[default]
    L20 = 20,
}

impl DepthLevel {
    /// Returns the level count
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }
}

impl TryFrom<u32> for DepthLevel {
    type Error = MexcError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(Self::L5),
            10 => Ok(Self::L10),
            20 => Ok(Self::L20),
            other => Err(MexcError::invalid_topic(
                "depth",
                format!("level {} not supported (valid: 5, 10, 20)", other),
            )),
        }
    }
}

/// Timezones accepted by the spot miniTicker streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Timezone {
    H24,
    UtcMinus10,
    UtcMinus8,
    UtcMinus7,
    UtcMinus6,
    UtcMinus5,
    UtcMinus4,
    UtcMinus3,
    Utc0,
    Utc1,
    Utc2,
    Utc3,
    Utc4,
    Utc4_30,
    Utc5,
    Utc5_30,
    Utc6,
    Utc7,
    #[default]
    Utc8,
    Utc9,
    Utc10,
    Utc11,
    Utc12,
    Utc12_45,
    Utc13,
}

impl Timezone {
    /// Every accepted timezone, in the exchange's documented order
    pub const ALL: [Timezone; 25] = [
        Self::H24,
        Self::UtcMinus10,
        Self::UtcMinus8,
        Self::UtcMinus7,
        Self::UtcMinus6,
        Self::UtcMinus5,
        Self::UtcMinus4,
        Self::UtcMinus3,
        Self::Utc0,
        Self::Utc1,
        Self::Utc2,
        Self::Utc3,
        Self::Utc4,
        Self::Utc4_30,
        Self::Utc5,
        Self::Utc5_30,
        Self::Utc6,
        Self::Utc7,
        Self::Utc8,
        Self::Utc9,
        Self::Utc10,
        Self::Utc11,
        Self::Utc12,
        Self::Utc12_45,
        Self::Utc13,
    ];

    /// Returns the timezone token used in channel names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::H24 => "24H",
            Self::UtcMinus10 => "UTC-10",
            Self::UtcMinus8 => "UTC-8",
            Self::UtcMinus7 => "UTC-7",
            Self::UtcMinus6 => "UTC-6",
            Self::UtcMinus5 => "UTC-5",
            Self::UtcMinus4 => "UTC-4",
            Self::UtcMinus3 => "UTC-3",
            Self::Utc0 => "UTC+0",
            Self::Utc1 => "UTC+1",
            Self::Utc2 => "UTC+2",
            Self::Utc3 => "UTC+3",
            Self::Utc4 => "UTC+4",
            Self::Utc4_30 => "UTC+4:30",
            Self::Utc5 => "UTC+5",
            Self::Utc5_30 => "UTC+5:30",
            Self::Utc6 => "UTC+6",
            Self::Utc7 => "UTC+7",
            Self::Utc8 => "UTC+8",
            Self::Utc9 => "UTC+9",
            Self::Utc10 => "UTC+10",
            Self::Utc11 => "UTC+11",
            Self::Utc12 => "UTC+12",
            Self::Utc12_45 => "UTC+12:45",
            Self::Utc13 => "UTC+13",
        }
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timezone {
    type Err = MexcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|tz| tz.as_str() == s)
            .ok_or_else(|| {
                MexcError::invalid_topic("public.miniTicker", format!("invalid timezone: {}", s))
            })
    }
}
