//! Subscription registry
//!
//! Maps topic keys to callbacks and remembers registration order so a new
//! session can replay every subscription. The registry has no locking of its
//! own; the client keeps it behind one mutex together with the live outbound
//! sender, and every access goes through the operations below.

use mexc_types::{MexcError, MexcResult, ProtocolVariant, Visibility};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::protocol::{AckTarget, Topic};

/// A routed data frame handed to a callback
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMessage {
    /// Key of the subscription the frame was routed to
    pub topic: String,
    /// The decoded frame
    pub payload: Value,
}

/// Caller-supplied handler for a subscription
pub type Callback = Arc<dyn Fn(&StreamMessage) + Send + Sync>;

/// Ack bookkeeping for a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Envelope sent (or queued), no ack yet
    Pending,
    /// Acknowledged by the server in the current session
    Active,
}

/// One registered topic
#[derive(Clone)]
pub struct Subscription<T> {
    /// Unique key within the client
    pub key: String,
    /// Typed topic used to rebuild envelopes
    pub topic: T,
    /// Handler invoked for every data frame on this key
    pub callback: Callback,
    /// Whether the topic needs authentication
    pub visibility: Visibility,
    /// Protocol family
    pub variant: ProtocolVariant,
    /// Ack state
    pub status: SubscriptionStatus,
}

impl<T: fmt::Debug> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("topic", &self.topic)
            .field("visibility", &self.visibility)
            .field("variant", &self.variant)
            .field("status", &self.status)
            .finish()
    }
}

struct Entry<T> {
    seq: u64,
    sub: Subscription<T>,
}

/// Topic key → subscription, in registration order
pub struct Registry<T> {
    entries: HashMap<String, Entry<T>>,
    next_seq: u64,
    limit: Option<usize>,
}

impl<T: Topic> Default for Registry<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T: Topic> Registry<T> {
    /// Create a registry, optionally capped at `limit` topics
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            next_seq: 0,
            limit,
        }
    }

    /// Fails if any key is registered or the batch would exceed the limit
    pub fn check_insert<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> MexcResult<()> {
        let mut count = 0;
        for key in keys {
            if self.entries.contains_key(key) {
                return Err(MexcError::DuplicateSubscription {
                    topic: key.to_string(),
                });
            }
            count += 1;
        }
        if let Some(limit) = self.limit {
            if self.entries.len() + count > limit {
                return Err(MexcError::SubscriptionLimit { limit });
            }
        }
        Ok(())
    }

    /// Register one subscription
    pub fn register(&mut self, sub: Subscription<T>) -> MexcResult<()> {
        self.register_all(vec![sub])
    }

    /// Register a batch, all or nothing
    pub fn register_all(&mut self, subs: Vec<Subscription<T>>) -> MexcResult<()> {
        self.check_insert(subs.iter().map(|s| s.key.as_str()))?;
        for sub in subs {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.entries.insert(sub.key.clone(), Entry { seq, sub });
        }
        Ok(())
    }

    /// Remove a subscription; absent keys are a no-op
    pub fn unregister(&mut self, key: &str) -> Option<Subscription<T>> {
        self.entries.remove(key).map(|entry| entry.sub)
    }

    /// Callback registered for `key`
    pub fn lookup(&self, key: &str) -> Option<Callback> {
        self.entries.get(key).map(|entry| entry.sub.callback.clone())
    }

    /// Returns true if `key` is registered
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Ack state of `key`
    pub fn status(&self, key: &str) -> Option<SubscriptionStatus> {
        self.entries.get(key).map(|entry| entry.sub.status)
    }

    /// All subscriptions in registration order
    pub fn snapshot(&self) -> Vec<Subscription<T>> {
        self.ordered().into_iter().map(|e| e.sub.clone()).collect()
    }

    /// All typed topics in registration order
    pub fn topics(&self) -> Vec<T> {
        self.ordered().into_iter().map(|e| e.sub.topic.clone()).collect()
    }

    /// All keys in registration order
    pub fn keys(&self) -> Vec<String> {
        self.ordered().into_iter().map(|e| e.sub.key.clone()).collect()
    }

    /// Keys whose topic has the given kind, in registration order
    ///
    /// A kind ending in `.` matches every kind with that prefix.
    pub fn keys_of_kind(&self, kind: &str) -> Vec<String> {
        let prefix = kind.ends_with('.');
        self.ordered()
            .into_iter()
            .filter(|e| {
                let topic_kind = e.sub.topic.kind();
                if prefix {
                    topic_kind.starts_with(kind)
                } else {
                    topic_kind == kind
                }
            })
            .map(|e| e.sub.key.clone())
            .collect()
    }

    /// Set every subscription back to pending (new session)
    pub fn mark_all_pending(&mut self) {
        for entry in self.entries.values_mut() {
            entry.sub.status = SubscriptionStatus::Pending;
        }
    }

    /// Set the given keys to pending
    pub fn mark_pending<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) {
        for key in keys {
            if let Some(entry) = self.entries.get_mut(key) {
                entry.sub.status = SubscriptionStatus::Pending;
            }
        }
    }

    /// Pending keys an ack or nack applies to
    pub fn resolve(&self, target: &AckTarget) -> Vec<String> {
        let pending: Vec<&Entry<T>> = self
            .ordered()
            .into_iter()
            .filter(|e| e.sub.status == SubscriptionStatus::Pending)
            .collect();

        match target {
            AckTarget::Keys(keys) => keys
                .iter()
                .filter(|k| pending.iter().any(|e| &e.sub.key == *k))
                .cloned()
                .collect(),
            AckTarget::OldestOfKind(kind) => pending
                .iter()
                .find(|e| e.sub.topic.kind() == kind)
                .map(|e| vec![e.sub.key.clone()])
                .unwrap_or_default(),
            AckTarget::KindPrefix(prefix) => pending
                .iter()
                .filter(|e| e.sub.topic.kind().starts_with(prefix.as_str()))
                .map(|e| e.sub.key.clone())
                .collect(),
            AckTarget::OldestPending => pending
                .first()
                .map(|e| vec![e.sub.key.clone()])
                .unwrap_or_default(),
        }
    }

    /// Mark the pending keys matched by `target` active, returning them
    pub fn confirm(&mut self, target: &AckTarget) -> Vec<String> {
        let keys = self.resolve(target);
        for key in &keys {
            if let Some(entry) = self.entries.get_mut(key) {
                entry.sub.status = SubscriptionStatus::Active;
            }
        }
        keys
    }

    /// Remove the keys matched by `target`, returning them
    ///
    /// A rejection that names its keys removes them whatever their status;
    /// positional targets only match pending entries.
    pub fn reject(&mut self, target: &AckTarget) -> Vec<Subscription<T>> {
        let keys: Vec<String> = match target {
            AckTarget::Keys(keys) => keys.iter().filter(|k| self.contains(k)).cloned().collect(),
            _ => self.resolve(target),
        };
        keys.iter().filter_map(|key| self.unregister(key)).collect()
    }

    /// Remove everything, returning the removed subscriptions in order
    pub fn clear(&mut self) -> Vec<Subscription<T>> {
        let subs = self.snapshot();
        self.entries.clear();
        subs
    }

    /// Number of registered topics
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured topic limit
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn ordered(&self) -> Vec<&Entry<T>> {
        let mut entries: Vec<&Entry<T>> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::futures::{FuturesTopic, PersonalTopic};
    use mexc_types::KlineInterval;

    fn sub(topic: FuturesTopic) -> Subscription<FuturesTopic> {
        let key = topic.key();
        Subscription {
            key,
            visibility: topic.visibility(),
            topic,
            callback: Arc::new(|_| {}),
            variant: ProtocolVariant::Futures,
            status: SubscriptionStatus::Pending,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = Registry::new(None);
        registry.register(sub(FuturesTopic::deal("BTC_USDT"))).unwrap();

        assert!(registry.lookup("deal:BTC_USDT").is_some());
        assert!(registry.lookup("deal:ETH_USDT").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_leaves_original() {
        let mut registry = Registry::new(None);
        registry.register(sub(FuturesTopic::deal("BTC_USDT"))).unwrap();

        let err = registry.register(sub(FuturesTopic::deal("BTC_USDT"))).unwrap_err();
        assert!(matches!(err, MexcError::DuplicateSubscription { ref topic } if topic == "deal:BTC_USDT"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let mut registry = Registry::new(None);
        registry.register(sub(FuturesTopic::deal("BTC_USDT"))).unwrap();

        let result = registry.register_all(vec![
            sub(FuturesTopic::ticker("BTC_USDT")),
            sub(FuturesTopic::deal("BTC_USDT")),
        ]);
        assert!(result.is_err());
        assert!(!registry.contains("ticker:BTC_USDT"));
    }

    #[test]
    fn test_limit() {
        let mut registry = Registry::new(Some(2));
        registry.register(sub(FuturesTopic::deal("A"))).unwrap();
        registry.register(sub(FuturesTopic::deal("B"))).unwrap();

        let err = registry.register(sub(FuturesTopic::deal("C"))).unwrap_err();
        assert!(matches!(err, MexcError::SubscriptionLimit { limit: 2 }));
    }

    #[test]
    fn test_snapshot_keeps_registration_order() {
        let mut registry = Registry::new(None);
        registry.register(sub(FuturesTopic::ticker("Z"))).unwrap();
        registry.register(sub(FuturesTopic::deal("A"))).unwrap();
        registry
            .register(sub(FuturesTopic::kline("M", KlineInterval::Min15)))
            .unwrap();
        registry.unregister("deal:A");
        registry.register(sub(FuturesTopic::deal("A"))).unwrap();

        assert_eq!(
            registry.keys(),
            vec!["ticker:Z", "kline:M:Min15", "deal:A"]
        );
    }

    #[test]
    fn test_confirm_oldest_of_kind() {
        let mut registry = Registry::new(None);
        registry.register(sub(FuturesTopic::deal("A"))).unwrap();
        registry.register(sub(FuturesTopic::deal("B"))).unwrap();

        let target = AckTarget::OldestOfKind("deal".into());
        assert_eq!(registry.confirm(&target), vec!["deal:A"]);
        assert_eq!(registry.confirm(&target), vec!["deal:B"]);
        assert!(registry.confirm(&target).is_empty());
        assert_eq!(registry.status("deal:A"), Some(SubscriptionStatus::Active));
    }

    #[test]
    fn test_reject_removes_pending() {
        let mut registry = Registry::new(None);
        registry.register(sub(FuturesTopic::deal("A"))).unwrap();
        registry
            .register(sub(FuturesTopic::Personal(PersonalTopic::Order)))
            .unwrap();
        registry
            .register(sub(FuturesTopic::Personal(PersonalTopic::Asset)))
            .unwrap();

        let removed = registry.reject(&AckTarget::KindPrefix("personal.".into()));
        assert_eq!(removed.len(), 2);
        assert_eq!(registry.keys(), vec!["deal:A"]);
        assert!(registry.reject(&AckTarget::Keys(vec!["deal:B".into()])).is_empty());
    }

    #[test]
    fn test_named_reject_removes_active_key() {
        let mut registry = Registry::new(None);
        registry.register(sub(FuturesTopic::deal("A"))).unwrap();
        registry.register(sub(FuturesTopic::deal("B"))).unwrap();
        registry.confirm(&AckTarget::Keys(vec!["deal:A".into()]));
        assert_eq!(registry.status("deal:A"), Some(SubscriptionStatus::Active));

        let removed = registry.reject(&AckTarget::OldestOfKind("deal".into()));
        assert_eq!(removed[0].key, "deal:B");
        assert!(registry.confirm(&AckTarget::Keys(vec!["deal:A".into()])).is_empty());

        let removed = registry.reject(&AckTarget::Keys(vec!["deal:A".into()]));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].key, "deal:A");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_keys_of_kind_and_clear() {
        let mut registry = Registry::new(None);
        registry.register(sub(FuturesTopic::deal("A"))).unwrap();
        registry.register(sub(FuturesTopic::ticker("A"))).unwrap();
        registry.register(sub(FuturesTopic::deal("B"))).unwrap();

        registry
            .register(sub(FuturesTopic::Personal(PersonalTopic::Position)))
            .unwrap();

        assert_eq!(registry.keys_of_kind("deal"), vec!["deal:A", "deal:B"]);
        assert_eq!(registry.keys_of_kind("personal."), vec!["personal.position"]);

        let cleared = registry.clear();
        assert_eq!(cleared.len(), 4);
        assert!(registry.is_empty());
    }
}
