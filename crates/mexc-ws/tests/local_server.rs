//! End-to-end tests against a local WebSocket server
//!
//! The server speaks just enough of the spot protocol to ack subscriptions
//! and push data, so these run without network access.

use futures_util::{SinkExt, StreamExt};
use mexc_types::{KlineInterval, MexcError, Speed};
use mexc_ws::{ConnectionConfig, ConnectionState, ReconnectConfig, SpotClient, SpotProtocol, SpotTopic};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};

const DEALS: &str = "spot@public.aggre.deals.v3.api@100ms@BTCUSDT";
const KLINE: &str = "spot@public.kline.v3.api@BTCUSDT@Min1";
const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct LocalServer {
    url: String,
    /// Text frames the client sent
    received: mpsc::UnboundedReceiver<String>,
    /// Text frames to push to the client
    push: mpsc::UnboundedSender<String>,
}

async fn spawn_server() -> LocalServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let (received_tx, received) = mpsc::unbounded_channel();
    let (push, mut push_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if received_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                },
                Some(text) = push_rx.recv() => {
                    if write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    LocalServer {
        url,
        received,
        push,
    }
}

fn deal_frame(channel: &str) -> String {
    format!(
        r#"{{"c":"{}","d":{{"deals":[{{"p":"93220.00","v":"0.04438243","S":2,"t":1736409765051}}]}},"s":"BTCUSDT","t":1736409765051}}"#,
        channel
    )
}

async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_subscribe_data_unsubscribe() {
    init_tracing();
    let mut server = spawn_server().await;
    let client = SpotClient::builder(SpotProtocol::json())
        .with_config(ConnectionConfig::new().with_url(server.url.clone()))
        .build();

    timeout(WAIT, client.connect()).await.unwrap().unwrap();
    assert_eq!(client.state(), ConnectionState::Ready);

    let (deals_tx, mut deals) = mpsc::unbounded_channel();
    let key = client
        .subscribe(SpotTopic::deals("BTCUSDT", Speed::Ms100), move |msg| {
            let _ = deals_tx.send(msg.payload.to_string());
        })
        .await
        .unwrap();
    assert_eq!(key, DEALS);
    assert_eq!(
        next(&mut server.received).await,
        format!(r#"{{"method":"SUBSCRIPTION","params":["{}"]}}"#, DEALS)
    );

    let (marker_tx, mut marked) = mpsc::unbounded_channel();
    client
        .subscribe(SpotTopic::kline("BTCUSDT", KlineInterval::Min1), move |msg| {
            let _ = marker_tx.send(msg.topic.clone());
        })
        .await
        .unwrap();
    next(&mut server.received).await;

    server
        .push
        .send(format!(r#"{{"id":0,"code":0,"msg":"{}"}}"#, DEALS))
        .unwrap();
    server.push.send(deal_frame(DEALS)).unwrap();
    let payload = next(&mut deals).await;
    assert!(payload.contains("93220.00"));

    client.unsubscribe(key.as_str()).unwrap();
    assert_eq!(
        next(&mut server.received).await,
        format!(r#"{{"method":"UNSUBSCRIPTION","params":["{}"]}}"#, DEALS)
    );

    server.push.send(deal_frame(DEALS)).unwrap();
    server.push.send(deal_frame(KLINE)).unwrap();
    assert_eq!(next(&mut marked).await, KLINE);
    assert!(deals.try_recv().is_err());

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_unreachable_server_exhausts_budget() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    drop(listener);

    let client = SpotClient::builder(SpotProtocol::json())
        .with_config(
            ConnectionConfig::new()
                .with_url(url)
                .with_timeout(Duration::from_secs(2))
                .with_reconnect(
                    ReconnectConfig::new()
                        .with_retries(2)
                        .with_delay(Duration::from_millis(50)),
                ),
        )
        .build();

    let err = timeout(WAIT, client.connect()).await.unwrap().unwrap_err();
    assert!(matches!(err, MexcError::ReconnectExhausted { attempts: 2, .. }));
    assert!(err.is_fatal());
}
