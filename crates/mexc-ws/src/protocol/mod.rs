//! Wire protocol adapters
//!
//! Spot and futures streams differ in envelopes, topic naming, auth,
//! heartbeats, and ack markers. [`Protocol`] captures exactly those
//! differences; the connection engine is written once against it.

pub mod futures;
pub mod spot;

use mexc_auth::Credentials;
use mexc_types::{MexcResult, ProtocolVariant, Visibility};
use serde_json::Value;
use std::fmt;

pub use self::futures::{FuturesProtocol, FuturesStream, FuturesTopic, PersonalTopic};
pub use self::spot::{SpotProtocol, SpotStream, SpotTopic, SPOT_MAX_TOPICS};

/// A typed topic with ordered parameters
pub trait Topic: Clone + fmt::Debug + Send + Sync + 'static {
    /// Topic kind shared by every instance of this stream (e.g. `deal`)
    fn kind(&self) -> &str;

    /// Whether the topic needs an authenticated connection
    fn visibility(&self) -> Visibility;
}

/// Explicit mapping from a convenience wrapper to the topic kind it subscribes
pub trait StreamKind: Copy + fmt::Debug + Send + Sync + 'static {
    /// Topic kind used on the wire
    fn kind(&self) -> &'static str;
}

/// How a connection acquires access to private topics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Listen key embedded in the URL
    ListenKey,
    /// Signed login frame after the socket opens
    LoginFrame,
}

/// Which pending subscriptions an ack or nack refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckTarget {
    /// Exact keys
    Keys(Vec<String>),
    /// The oldest pending key of this kind
    OldestOfKind(String),
    /// Every pending key whose kind starts with this prefix
    KindPrefix(String),
    /// The oldest pending key of any kind
    OldestPending,
}

/// Classification of one decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Pong or keep-alive marker
    Heartbeat,
    /// Response to the login frame
    AuthAck { success: bool, detail: String },
    /// Subscription confirmed
    SubscribeAck { target: AckTarget },
    /// Subscription rejected
    SubscribeNack { target: AckTarget, reason: String },
    /// Unsubscribe confirmed
    UnsubscribeAck { detail: String },
    /// Error pushed by the server
    ServerError { reason: String },
    /// Data frame; `keys` are candidate registry keys, most specific first
    Data { keys: Vec<String>, payload: Value },
    /// Anything else
    Unknown { payload: Value },
}

/// Protocol-specific half of a stream client
pub trait Protocol: Send + Sync + 'static {
    /// Typed topics accepted by this protocol
    type Topic: Topic;
    /// Wrapper table for unsubscribe-by-stream
    type Stream: StreamKind;

    /// Protocol family
    fn variant(&self) -> ProtocolVariant;

    /// URL used when the configuration does not override it
    fn default_url(&self) -> &'static str;

    /// How private topics are authorized
    fn auth_mode(&self) -> AuthMode;

    /// Per-connection topic limit
    fn max_topics(&self) -> Option<usize> {
        None
    }

    /// Registry key for a topic
    fn topic_key(&self, topic: &Self::Topic) -> String;

    /// Reject malformed topic parameters
    fn validate(&self, topic: &Self::Topic) -> MexcResult<()>;

    /// Envelopes subscribing `topics`
    ///
    /// `registered` is every topic registered once these are added, in
    /// registration order.
    fn subscribe_frames(
        &self,
        topics: &[Self::Topic],
        registered: &[Self::Topic],
    ) -> MexcResult<Vec<String>>;

    /// Envelopes unsubscribing `topics`
    ///
    /// `remaining` is every topic still registered once these are removed.
    fn unsubscribe_frames(
        &self,
        topics: &[Self::Topic],
        remaining: &[Self::Topic],
    ) -> MexcResult<Vec<String>>;

    /// Application-level ping literal
    fn ping_frame(&self) -> &'static str;

    /// Login frame sent after connect, if this protocol uses one
    fn login_frame(&self, _credentials: &Credentials, _req_time: u64) -> MexcResult<Option<String>> {
        Ok(None)
    }

    /// Classify a decoded frame
    fn classify(&self, msg: Value) -> Inbound;
}
