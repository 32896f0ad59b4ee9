//! Builder integration tests
//!
//! Clients come out of `MexcClientBuilder` and run against the mock
//! connector, so no network is involved.

use mexc_sdk::prelude::*;
use mexc_ws::MockConnector;
use serde_json::Value;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn base() -> MexcClientBuilder {
    MexcClientBuilder::new()
        .with_ping_interval(Duration::from_secs(3600))
        .with_auth_timeout(Duration::from_secs(5))
}

#[tokio::test(start_paused = true)]
async fn test_futures_credentials_send_login() {
    init_tracing();
    let (connector, mut server) = MockConnector::new();
    let credentials = Credentials::new("api-key", "api-secret").unwrap();
    let client = base()
        .with_credentials(credentials)
        .futures_builder()
        .unwrap()
        .with_connector(connector)
        .build();

    let (connected, (mut session, login)) = tokio::join!(client.connect(), async {
        let mut session = server.accept().await.unwrap();
        let login = session.next_sent().await.unwrap();
        session.push_text(r#"{"channel":"rs.login","data":"success","ts":1}"#);
        (session, login)
    });
    connected.unwrap();

    let login: Value = serde_json::from_str(&login).unwrap();
    assert_eq!(login["method"], "login");
    assert_eq!(login["subscribe"], false);
    assert!(client.is_authenticated());

    client.position_stream(|_| {}).await.unwrap();
    let filter: Value = serde_json::from_str(&session.next_sent().await.unwrap()).unwrap();
    assert_eq!(filter["method"], "personal.filter");
    assert_eq!(filter["param"]["filters"][0]["filter"], "position");

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_futures_without_credentials_rejects_personal() {
    init_tracing();
    let (connector, _server) = MockConnector::new();
    let client = base().futures_builder().unwrap().with_connector(connector).build();

    let err = client.order_stream(|_| {}).await.unwrap_err();
    assert!(matches!(err, MexcError::AuthRequired { .. }));
    assert!(client.subscribed_topics().is_empty());
}

#[tokio::test]
async fn test_spot_credentials_need_a_listen_key() {
    init_tracing();
    let (connector, server) = MockConnector::new();
    let credentials = Credentials::new("api-key", "api-secret").unwrap();
    let client = base()
        .with_credentials(credentials)
        .with_rest_url("http://127.0.0.1:9")
        .spot_builder()
        .unwrap()
        .with_connector(connector)
        .build();

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, MexcError::Credential(_)));
    assert!(server.attempts().is_empty());
}

#[test]
fn test_invalid_settings_fail_before_build() {
    let err = base()
        .with_timeout(Duration::from_millis(10))
        .futures_builder()
        .unwrap_err();
    assert!(matches!(err, ConfigError::TimeoutTooShort));

    let err = base()
        .with_renew_interval(Duration::ZERO)
        .spot_builder()
        .unwrap_err();
    assert!(matches!(err, ConfigError::RenewIntervalZero));
}
