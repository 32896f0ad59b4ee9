//! Re-exports for convenience
//!
//! Import everything you need with:
//! ```
//! use mexc_sdk::prelude::*;
//! ```

// Clients
pub use crate::builder::{ConfigError, MexcClientBuilder};
pub use mexc_ws::{FuturesClient, SpotClient, StreamClient, StreamClientBuilder, Unsubscribe};

// Types from mexc-types
pub use mexc_types::{
    DepthLevel, KlineInterval, MexcError, MexcResult, ProtocolVariant, Speed, Timezone, Visibility,
};

// Credentials
pub use mexc_auth::{Credentials, ListenKey, ListenKeyProvider};

// WebSocket types
pub use mexc_ws::{
    ConnectInfo, ConnectionConfig, ConnectionState, DisconnectInfo, Endpoint, FuturesProtocol,
    FuturesStream, FuturesTopic, Hooks, PersonalTopic, ReconnectConfig, SpotProtocol, SpotStream,
    SpotTopic, StreamMessage, SubscriptionInfo, SubscriptionStatus,
};
