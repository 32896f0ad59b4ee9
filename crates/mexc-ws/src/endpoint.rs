//! WebSocket endpoint definitions

use std::fmt;

/// Spot v3 stream URL
pub const SPOT_WS_URL: &str = "wss://wbs-api.mexc.com/ws";

/// Futures contract stream URL
pub const FUTURES_WS_URL: &str = "wss://contract.mexc.com/edge";

/// MEXC WebSocket endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endpoint {
    /// Spot public and private streams (default)
    #[default]
    Spot,
    /// Futures public and personal streams
    Futures,
}

impl Endpoint {
    /// Get the WebSocket URL for this endpoint
    pub fn url(&self) -> &'static str {
        match self {
            Self::Spot => SPOT_WS_URL,
            Self::Futures => FUTURES_WS_URL,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

/// Append `listenKey=<token>` to `base`
pub fn with_listen_key(base: &str, token: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{}{}listenKey={}", base, sep, token)
}

/// Replace the listen key in `url` with a placeholder for logging
pub fn redact(url: &str) -> String {
    match url.find("listenKey=") {
        Some(idx) => {
            let start = idx + "listenKey=".len();
            let end = url[start..]
                .find('&')
                .map(|offset| start + offset)
                .unwrap_or(url.len());
            format!("{}[REDACTED]{}", &url[..start], &url[end..])
        }
        None => url.to_string(),
    }
}
