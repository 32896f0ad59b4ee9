//! Inbound frame routing
//!
//! Decodes a frame, classifies it through the protocol, and applies the
//! result: ack bookkeeping, auth flag, or a callback for data frames.
//! Callbacks run after the registry lock is released.

use crate::connection::Shared;
use crate::hooks::SubscriptionInfo;
use crate::protocol::{Inbound, Protocol};
use crate::subscription::StreamMessage;
use crate::transport::Frame;

use std::sync::atomic::Ordering;
use tracing::{debug, info, trace, warn};

/// What routing a frame did, as far as the caller cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Routed {
    /// A login response with its outcome
    Auth(bool),
    Other,
}

pub(crate) fn route<P: Protocol>(shared: &Shared<P>, frame: &Frame) -> Routed {
    shared.hooks.invoke_message(frame.len());

    let value = match shared.decoder.decode(frame) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, bytes = frame.len(), "dropping undecodable frame");
            return Routed::Other;
        }
    };

    match shared.protocol.classify(value) {
        Inbound::Heartbeat => trace!("heartbeat"),
        Inbound::AuthAck { success, detail } => {
            shared.authenticated.store(success, Ordering::SeqCst);
            if success {
                info!("login accepted");
            } else {
                warn!(detail = %detail, "login rejected, private topics stay inactive");
                shared
                    .hooks
                    .invoke_error(&format!("login rejected: {}", detail));
            }
            return Routed::Auth(success);
        }
        Inbound::SubscribeAck { target } => {
            let confirmed = shared.inner.lock().registry.confirm(&target);
            for key in confirmed {
                debug!(key = %key, "subscription confirmed");
                shared.hooks.invoke_subscription(&SubscriptionInfo {
                    key,
                    accepted: true,
                    reason: None,
                });
            }
        }
        Inbound::SubscribeNack { target, reason } => {
            let rejected = shared.inner.lock().registry.reject(&target);
            if rejected.is_empty() {
                warn!(reason = %reason, target = ?target, "rejection matched no subscription");
            }
            for sub in rejected {
                warn!(key = %sub.key, reason = %reason, "subscription rejected");
                shared.hooks.invoke_subscription(&SubscriptionInfo {
                    key: sub.key,
                    accepted: false,
                    reason: Some(reason.clone()),
                });
            }
        }
        Inbound::UnsubscribeAck { detail } => debug!(detail = %detail, "unsubscribe acknowledged"),
        Inbound::ServerError { reason } => {
            warn!(reason = %reason, "server error");
            shared.hooks.invoke_error(&reason);
        }
        Inbound::Data { keys, payload } => {
            let target = {
                let inner = shared.inner.lock();
                keys.iter()
                    .find_map(|key| inner.registry.lookup(key).map(|cb| (key.clone(), cb)))
            };
            match target {
                Some((topic, callback)) => callback(&StreamMessage { topic, payload }),
                None => trace!(keys = ?keys, "no subscription for data frame"),
            }
        }
        Inbound::Unknown { payload } => debug!(payload = %payload, "unhandled frame"),
    }

    Routed::Other
}
