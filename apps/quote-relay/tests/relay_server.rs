//! Relay Server Integration Tests
//!
//! Runs the full HTTP/WebSocket stack against a local fake provider that
//! speaks plain `ws://`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Error;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;

use quote_relay::{
    Credentials, LIVENESS_BODY, RelayConfig, RelayServer, SessionRegistry, TungsteniteDialer,
    router,
};

const WAIT: Duration = Duration::from_secs(5);

const PRICE: &str = r#"{"event":"price","symbol":"AAPL","currency":"USD","exchange":"NASDAQ","type":"Common Stock","timestamp":1700000000,"price":189.71}"#;

/// What the fake provider observed on its single connection.
struct ProviderLog {
    uri: oneshot::Receiver<String>,
    subscribe: oneshot::Receiver<String>,
    closed: oneshot::Receiver<()>,
}

/// Accept one provider connection, answer the subscription with one price
/// event and report when the relay hangs up.
async fn fake_provider() -> (SocketAddr, ProviderLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (uri_tx, uri) = oneshot::channel();
    let (subscribe_tx, subscribe) = oneshot::channel();
    let (closed_tx, closed) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let _ = uri_tx.send(request.uri().to_string());
            Ok(response)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();

        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = subscribe_tx.send(text.as_str().to_owned());
        }

        ws.send(Message::Text(PRICE.into())).await.unwrap();

        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
        let _ = closed_tx.send(());
    });

    (addr, ProviderLog { uri, subscribe, closed })
}

type Registry = Arc<SessionRegistry<TungsteniteDialer>>;

async fn start_relay(provider: SocketAddr) -> (SocketAddr, CancellationToken) {
    let (addr, shutdown, _) = start_capped_relay(provider, 0).await;
    (addr, shutdown)
}

async fn start_capped_relay(
    provider: SocketAddr,
    max_sessions: usize,
) -> (SocketAddr, CancellationToken, Registry) {
    let mut config = RelayConfig::new(Credentials::new("test-key".to_string()));
    config.upstream.base_url = format!("ws://{provider}/v1/quotes/price");
    config.server.max_sessions = max_sessions;

    let registry = Arc::new(SessionRegistry::from_relay_config(
        &config,
        TungsteniteDialer::new(),
    ));
    let shutdown = CancellationToken::new();
    let app = router(Arc::clone(&registry), &config.cors, shutdown.clone());

    let server = RelayServer::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        server.serve(app, server_shutdown).await.unwrap();
    });

    (addr, shutdown, registry)
}

#[tokio::test]
async fn client_receives_stock_data_from_provider() {
    let (provider, log) = fake_provider().await;
    let (relay, shutdown) = start_relay(provider).await;

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{relay}/ws"))
        .await
        .unwrap();

    let frame = timeout(WAIT, client.next())
        .await
        .expect("timed out waiting for stockData")
        .unwrap()
        .unwrap();
    let Message::Text(text) = frame else {
        panic!("expected text frame, got {frame:?}");
    };
    let envelope: Value = serde_json::from_str(text.as_str()).unwrap();

    assert_eq!(envelope["event"], "stockData");
    assert_eq!(envelope["data"], serde_json::from_str::<Value>(PRICE).unwrap());

    let uri = timeout(WAIT, log.uri).await.unwrap().unwrap();
    assert_eq!(uri, "/v1/quotes/price?apikey=test-key");

    let subscribe: Value =
        serde_json::from_str(&timeout(WAIT, log.subscribe).await.unwrap().unwrap()).unwrap();
    assert_eq!(
        subscribe,
        json!({
            "action": "subscribe",
            "params": {"symbols": "AAPL,BTC/USD,ETH/USD,EUR/USD,GBP/USD,USD/JPY,USD/INR"}
        })
    );

    client.close(None).await.unwrap();
    timeout(WAIT, log.closed)
        .await
        .expect("provider connection was not closed after client left")
        .unwrap();

    shutdown.cancel();
}

#[tokio::test]
async fn liveness_over_http() {
    let (provider, _log) = fake_provider().await;
    let (relay, shutdown) = start_relay(provider).await;

    let mut stream = TcpStream::connect(relay).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    timeout(WAIT, stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.ends_with(LIVENESS_BODY), "{response}");

    shutdown.cancel();
}

#[tokio::test]
async fn full_relay_refuses_upgrade_with_503() {
    let (provider, _log) = fake_provider().await;
    let (relay, shutdown, registry) = start_capped_relay(provider, 1).await;

    let (mut first, _) = tokio_tungstenite::connect_async(format!("ws://{relay}/ws"))
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + WAIT;
    while registry.active_sessions() != 1 {
        assert!(tokio::time::Instant::now() < deadline, "first session never attached");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let second = tokio_tungstenite::connect_async(format!("ws://{relay}/ws")).await;
    match second {
        Err(Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
        Err(e) => panic!("expected 503 for second client, got {e}"),
        Ok(_) => panic!("second client was admitted past the session cap"),
    }
    assert_eq!(registry.active_sessions(), 1);

    first.close(None).await.unwrap();
    shutdown.cancel();
}
