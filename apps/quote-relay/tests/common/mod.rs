//! Shared test doubles for the relay integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use quote_relay::infrastructure::config::UpstreamEndpoint;
use quote_relay::{
    ClientSink, ClientSinkError, ConnectorConfig, Credentials, InstrumentSet, UpstreamDialer,
    UpstreamError, UpstreamFrame, UpstreamLink,
};

/// How long a test waits for an asynchronous condition.
pub const WAIT: Duration = Duration::from_secs(2);

/// Subscribe frame for the default instrument set.
pub const DEFAULT_SUBSCRIBE: &str =
    r#"{"action":"subscribe","params":{"symbols":"AAPL,BTC/USD,ETH/USD,EUR/USD,GBP/USD,USD/JPY,USD/INR"}}"#;

pub fn connector_config() -> ConnectorConfig {
    ConnectorConfig::new(
        UpstreamEndpoint::new(
            "ws://upstream.test/v1/quotes/price".to_string(),
            Credentials::new("test-key".to_string()),
        ),
        InstrumentSet::default(),
    )
}

/// Poll `condition` until it holds or [`WAIT`] elapses.
pub async fn eventually<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// =============================================================================
// Upstream
// =============================================================================

/// What a [`MockDialer`] does on each dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialMode {
    /// Hand out a live link and publish its controller.
    Connect,
    /// Like `Connect`, but the link's closing handshake never completes.
    ConnectStuckClose,
    /// Never complete.
    Pending,
    /// Fail immediately.
    Fail,
}

struct DialerInner {
    mode: DialMode,
    dials: AtomicUsize,
    urls: Mutex<Vec<String>>,
    upstreams: mpsc::UnboundedSender<MockUpstream>,
}

/// Scriptable upstream dialer. Clones share state.
#[derive(Clone)]
pub struct MockDialer {
    inner: Arc<DialerInner>,
}

impl MockDialer {
    /// Dialer plus the stream of controllers, one per successful dial.
    pub fn new(mode: DialMode) -> (Self, mpsc::UnboundedReceiver<MockUpstream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dialer = Self {
            inner: Arc::new(DialerInner {
                mode,
                dials: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
                upstreams: tx,
            }),
        };
        (dialer, rx)
    }

    pub fn dial_count(&self) -> usize {
        self.inner.dials.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.inner.urls.lock().clone()
    }
}

#[async_trait]
impl UpstreamDialer for MockDialer {
    type Link = MockLink;

    async fn dial(&self, url: &str) -> Result<MockLink, UpstreamError> {
        self.inner.dials.fetch_add(1, Ordering::SeqCst);
        self.inner.urls.lock().push(url.to_string());

        match self.inner.mode {
            DialMode::Pending => std::future::pending().await,
            DialMode::Fail => Err(UpstreamError::ConnectFailed(
                "connection refused".to_string(),
            )),
            mode @ (DialMode::Connect | DialMode::ConnectStuckClose) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let record = Arc::new(LinkRecord::default());
                let _ = self.inner.upstreams.send(MockUpstream {
                    frames: tx,
                    record: Arc::clone(&record),
                });
                Ok(MockLink {
                    frames: rx,
                    record,
                    stuck_close: mode == DialMode::ConnectStuckClose,
                })
            }
        }
    }
}

/// Everything the relay did to one link.
#[derive(Default)]
pub struct LinkRecord {
    sent: Mutex<Vec<String>>,
    pongs: Mutex<Vec<Vec<u8>>>,
    closes: AtomicUsize,
}

impl LinkRecord {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn pongs(&self) -> Vec<Vec<u8>> {
        self.pongs.lock().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Provider side of one mock connection.
pub struct MockUpstream {
    frames: mpsc::UnboundedSender<Result<UpstreamFrame, UpstreamError>>,
    pub record: Arc<LinkRecord>,
}

impl MockUpstream {
    pub fn text(&self, text: &str) {
        let _ = self.frames.send(Ok(UpstreamFrame::Text(text.to_string())));
    }

    pub fn binary(&self, data: &[u8]) {
        let _ = self.frames.send(Ok(UpstreamFrame::Binary(data.to_vec())));
    }

    pub fn ping(&self, payload: &[u8]) {
        let _ = self.frames.send(Ok(UpstreamFrame::Ping(payload.to_vec())));
    }

    pub fn close(&self) {
        let _ = self.frames.send(Ok(UpstreamFrame::Close));
    }

    pub fn fail(&self, reason: &str) {
        let _ = self
            .frames
            .send(Err(UpstreamError::Transport(reason.to_string())));
    }

    /// Wait for the relay to send its subscription.
    pub async fn subscribed(&self) {
        let watched = Arc::clone(&self.record);
        eventually("subscribe frame", move || !watched.sent().is_empty()).await;
    }
}

/// Relay side of one mock connection.
pub struct MockLink {
    frames: mpsc::UnboundedReceiver<Result<UpstreamFrame, UpstreamError>>,
    record: Arc<LinkRecord>,
    stuck_close: bool,
}

#[async_trait]
impl UpstreamLink for MockLink {
    async fn send_text(&mut self, text: String) -> Result<(), UpstreamError> {
        self.record.sent.lock().push(text);
        Ok(())
    }

    async fn send_pong(&mut self, payload: Vec<u8>) -> Result<(), UpstreamError> {
        self.record.pongs.lock().push(payload);
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<UpstreamFrame, UpstreamError>> {
        self.frames.recv().await
    }

    async fn close(&mut self) -> Result<(), UpstreamError> {
        self.record.closes.fetch_add(1, Ordering::SeqCst);
        if self.stuck_close {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Wait for the next controller published by a [`MockDialer`].
pub async fn next_upstream(rx: &mut mpsc::UnboundedReceiver<MockUpstream>) -> MockUpstream {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for upstream dial")
        .expect("dialer dropped")
}

// =============================================================================
// Downstream
// =============================================================================

/// Client that records every emitted event.
#[derive(Clone, Default)]
pub struct RecordingClient {
    received: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingClient {
    pub fn received(&self) -> Vec<(String, Value)> {
        self.received.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.received.lock().len()
    }
}

#[async_trait]
impl ClientSink for RecordingClient {
    async fn emit(&mut self, event: &str, payload: &Value) -> Result<(), ClientSinkError> {
        self.received
            .lock()
            .push((event.to_string(), payload.clone()));
        Ok(())
    }
}

/// Client whose transport always fails.
#[derive(Clone, Default)]
pub struct FailingClient {
    attempts: Arc<AtomicUsize>,
}

impl FailingClient {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientSink for FailingClient {
    async fn emit(&mut self, _event: &str, _payload: &Value) -> Result<(), ClientSinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ClientSinkError::Send("broken pipe".to_string()))
    }
}
