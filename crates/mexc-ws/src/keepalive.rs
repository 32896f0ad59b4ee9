//! Keep-alive: application pings and listen key renewal

use crate::connection::{shutdown_signal, Shared};
use crate::protocol::Protocol;

use chrono::Utc;
use mexc_auth::ListenKeyProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Ticker whose first tick fires one period from now
pub(crate) fn ping_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Renew the listen key every `renew_interval` until shutdown
///
/// Runs independently of the connection state. A failed renewal is logged
/// and retried at the next interval.
pub(crate) async fn renew_listen_key<P: Protocol>(
    shared: Arc<Shared<P>>,
    provider: Arc<dyn ListenKeyProvider>,
) {
    let mut shutdown = shared.shutdown_tx.subscribe();
    let period = shared.config.renew_interval;
    let mut ticker = ping_ticker(period);
    info!(interval = ?period, "listen key renewal started");

    loop {
        tokio::select! {
            _ = shutdown_signal(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }

        let token = shared.listen_key.lock().as_ref().map(|k| k.token.clone());
        let Some(token) = token else {
            debug!("no listen key to renew");
            continue;
        };

        match provider.renew_listen_key(&token).await {
            Ok(()) => {
                if let Some(key) = shared.listen_key.lock().as_mut() {
                    if key.token == token {
                        key.issued_at = Utc::now();
                    }
                }
                debug!("listen key renewed");
            }
            Err(e) => {
                warn!(error = %e, "listen key renewal failed, retrying next interval");
                shared
                    .hooks
                    .invoke_error(&format!("listen key renewal failed: {}", e));
            }
        }
    }

    debug!("listen key renewal stopped");
}
