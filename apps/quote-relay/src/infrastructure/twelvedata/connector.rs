//! Upstream Connector
//!
//! Owns the single provider connection of one session.
//!
//! # Lifecycle
//!
//! 1. [`UpstreamConnector::open`] moves to `connecting` and spawns the
//!    connection task, which dials the provider.
//! 2. When the dial succeeds the state becomes `open` and exactly one
//!    subscription frame is sent for the configured instruments.
//! 3. Every inbound text or binary frame is decoded and pushed to the owning
//!    session as [`UpstreamEvent::Quote`]. Undecodable frames are logged and
//!    dropped; they never close the connection.
//! 4. [`UpstreamConnector::close`] cancels the task. A live transport is
//!    closed exactly once; a pending dial is abandoned without sending.
//!
//! Dial failures, transport errors and remote closes are reported as events
//! and log lines only. With reconnect disabled (the default) the connection
//! then stays closed for the rest of the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, JsonCodec};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{UpstreamDialer, UpstreamFrame, UpstreamLink};
use crate::domain::quote::{InstrumentSet, Quote, SubscribeRequest};
use crate::domain::session::{ConnectionState, SessionId};
use crate::infrastructure::config::{RelayConfig, UpstreamEndpoint};
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Upper bound on the closing handshake with the provider.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a connector needs to open and subscribe a connection.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Provider endpoint, credentials included.
    pub endpoint: UpstreamEndpoint,
    /// Symbols subscribed on every connection.
    pub instruments: InstrumentSet,
    /// Reconnection policy configuration.
    pub reconnect: ReconnectConfig,
    /// Capacity of the event channel towards the session.
    pub event_capacity: usize,
    /// How long a close waits for the provider before dropping the link.
    pub close_timeout: Duration,
}

impl ConnectorConfig {
    /// Fire-once configuration for the given endpoint and instruments.
    #[must_use]
    pub const fn new(endpoint: UpstreamEndpoint, instruments: InstrumentSet) -> Self {
        Self {
            endpoint,
            instruments,
            reconnect: ReconnectConfig::disabled(),
            event_capacity: 1024,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Replace the reconnection configuration.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Derive connector settings from the relay configuration.
    #[must_use]
    pub fn from_relay_config(config: &RelayConfig) -> Self {
        Self {
            endpoint: config.upstream_endpoint(),
            instruments: config.upstream.instruments.clone(),
            reconnect: ReconnectConfig::from_settings(&config.upstream.reconnect),
            event_capacity: config.upstream.event_capacity,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Events pushed from a connector to its session.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// Transport established.
    Opened,
    /// Subscription frame sent.
    Subscribed,
    /// Decoded upstream message.
    Quote(Quote),
    /// Connection-level failure (dial, transport, subscribe).
    Error(String),
    /// Connection ended without being asked to.
    Closed,
    /// Waiting before another dial.
    Reconnecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
}

/// Result of [`UpstreamConnector::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// A live transport was closed by this call.
    Closed,
    /// Nothing was open: never opened, already closed, or already closed by
    /// an earlier call.
    NotOpen,
}

// =============================================================================
// State
// =============================================================================

/// Connection state shared between the connector handle and its task.
#[derive(Debug)]
struct StateCell {
    state: parking_lot::RwLock<ConnectionState>,
    allow_reconnect: bool,
}

impl StateCell {
    const fn new(allow_reconnect: bool) -> Self {
        Self {
            state: parking_lot::RwLock::new(ConnectionState::Idle),
            allow_reconnect,
        }
    }

    fn get(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Apply a legal transition; illegal ones are logged and ignored.
    fn transition(&self, session_id: SessionId, next: ConnectionState) -> bool {
        let mut state = self.state.write();
        let current = *state;
        if !current.can_transition_to(next, self.allow_reconnect) {
            tracing::debug!(
                session_id = %session_id,
                from = %current,
                to = %next,
                "Ignoring illegal upstream state transition"
            );
            return false;
        }

        if current.is_open() {
            metrics::upstream_closed();
        }
        if next.is_open() {
            metrics::upstream_opened();
        }

        *state = next;
        true
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Handle to one session's upstream connection.
///
/// Dropping the handle cancels the connection task, so the upstream can never
/// outlive its owner.
pub struct UpstreamConnector {
    session_id: SessionId,
    state: Arc<StateCell>,
    cancel: CancellationToken,
    task: Option<JoinHandle<CloseOutcome>>,
}

impl UpstreamConnector {
    /// Start connecting. Returns immediately in the `connecting` state.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn open<D: UpstreamDialer>(
        session_id: SessionId,
        config: Arc<ConnectorConfig>,
        dialer: Arc<D>,
        events: mpsc::Sender<UpstreamEvent>,
    ) -> Self {
        let state = Arc::new(StateCell::new(config.reconnect.enabled()));
        state.transition(session_id, ConnectionState::Connecting);

        let cancel = CancellationToken::new();
        let task = ConnectionTask {
            session_id,
            config,
            dialer,
            events,
            cancel: cancel.clone(),
            state: Arc::clone(&state),
            codec: JsonCodec::new(),
        };

        Self {
            session_id,
            state,
            cancel,
            task: Some(tokio::spawn(task.run())),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Close the connection and wait for the task to finish.
    ///
    /// Idempotent: only the first call can return [`CloseOutcome::Closed`].
    pub async fn close(&mut self) -> CloseOutcome {
        let Some(task) = self.task.take() else {
            return CloseOutcome::NotOpen;
        };

        self.cancel.cancel();

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    session_id = %self.session_id,
                    error = %e,
                    "Upstream connection task failed"
                );
                self.state
                    .transition(self.session_id, ConnectionState::Closed);
                CloseOutcome::NotOpen
            }
        }
    }
}

impl Drop for UpstreamConnector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for UpstreamConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConnector")
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Connection Task
// =============================================================================

/// How a live link stopped.
enum LinkEnd {
    /// Owner asked to close.
    Cancelled,
    /// Remote close, stream end, or transport error.
    Lost,
}

struct ConnectionTask<D: UpstreamDialer> {
    session_id: SessionId,
    config: Arc<ConnectorConfig>,
    dialer: Arc<D>,
    events: mpsc::Sender<UpstreamEvent>,
    cancel: CancellationToken,
    state: Arc<StateCell>,
    codec: JsonCodec,
}

impl<D: UpstreamDialer> ConnectionTask<D> {
    async fn run(self) -> CloseOutcome {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());
        let url = self.config.endpoint.url();

        loop {
            tracing::info!(
                session_id = %self.session_id,
                endpoint = %self.config.endpoint,
                "Connecting to upstream"
            );

            let dialed = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::debug!(session_id = %self.session_id, "Upstream dial abandoned");
                    self.state.transition(self.session_id, ConnectionState::Closed);
                    return CloseOutcome::NotOpen;
                }
                result = self.dialer.dial(&url) => result,
            };

            match dialed {
                Ok(mut link) => {
                    if let LinkEnd::Cancelled = self.drive(&mut link).await {
                        return self.shutdown(link).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        endpoint = %self.config.endpoint,
                        error = %e,
                        "Upstream connection failed"
                    );
                    metrics::record_upstream_error("connect");
                    self.state.transition(self.session_id, ConnectionState::Closed);
                    self.emit(UpstreamEvent::Error(e.to_string())).await;
                }
            }

            self.emit(UpstreamEvent::Closed).await;

            let Some(delay) = policy.next_delay() else {
                return CloseOutcome::NotOpen;
            };

            let attempt = policy.attempt_count();
            tracing::info!(
                session_id = %self.session_id,
                attempt,
                delay_ms = delay.as_millis(),
                "Reconnecting to upstream"
            );
            metrics::record_reconnect();
            self.emit(UpstreamEvent::Reconnecting { attempt }).await;

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return CloseOutcome::NotOpen,
                () = tokio::time::sleep(delay) => {}
            }

            self.state
                .transition(self.session_id, ConnectionState::Connecting);
        }
    }

    /// Run one established link until it is lost or the owner cancels.
    async fn drive(&self, link: &mut D::Link) -> LinkEnd {
        self.state.transition(self.session_id, ConnectionState::Open);
        tracing::info!(session_id = %self.session_id, "Upstream connected");
        self.emit(UpstreamEvent::Opened).await;

        if self.cancel.is_cancelled() {
            return LinkEnd::Cancelled;
        }

        let subscribed = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return LinkEnd::Cancelled,
            result = self.subscribe(link) => result,
        };

        if let Err(e) = subscribed {
            tracing::warn!(
                session_id = %self.session_id,
                error = %e,
                "Failed to send upstream subscription"
            );
            metrics::record_upstream_error("subscribe");
            self.emit(UpstreamEvent::Error(e)).await;
            return self.lost();
        }

        loop {
            let frame = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return LinkEnd::Cancelled,
                frame = link.next_frame() => frame,
            };

            match frame {
                Some(Ok(UpstreamFrame::Text(text))) => {
                    self.handle_decoded(self.codec.decode(&text)).await;
                }
                Some(Ok(UpstreamFrame::Binary(data))) => {
                    self.handle_decoded(self.codec.decode_bytes(&data)).await;
                }
                Some(Ok(UpstreamFrame::Ping(payload))) => {
                    let ponged = tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => return LinkEnd::Cancelled,
                        result = link.send_pong(payload) => result,
                    };
                    if let Err(e) = ponged {
                        tracing::debug!(
                            session_id = %self.session_id,
                            error = %e,
                            "Failed to answer upstream ping"
                        );
                    }
                }
                Some(Ok(UpstreamFrame::Pong)) => {}
                Some(Ok(UpstreamFrame::Close)) => {
                    tracing::info!(session_id = %self.session_id, "Upstream sent close frame");
                    return self.lost();
                }
                Some(Err(e)) => {
                    tracing::error!(
                        session_id = %self.session_id,
                        error = %e,
                        "Upstream WebSocket error"
                    );
                    metrics::record_upstream_error("transport");
                    self.emit(UpstreamEvent::Error(e.to_string())).await;
                    return self.lost();
                }
                None => {
                    tracing::info!(session_id = %self.session_id, "Upstream stream ended");
                    return self.lost();
                }
            }
        }
    }

    async fn subscribe(&self, link: &mut D::Link) -> Result<(), String> {
        let request = SubscribeRequest::subscribe(&self.config.instruments);
        let json = self
            .codec
            .encode_subscribe(&request)
            .map_err(|e| format!("failed to serialize subscribe: {e}"))?;

        link.send_text(json)
            .await
            .map_err(|e| format!("failed to send subscribe: {e}"))?;

        tracing::info!(
            session_id = %self.session_id,
            symbols = %request.params.symbols,
            "Subscribed to upstream instruments"
        );
        self.emit(UpstreamEvent::Subscribed).await;
        Ok(())
    }

    async fn handle_decoded(&self, decoded: Result<Quote, CodecError>) {
        match decoded {
            Ok(quote) => {
                metrics::record_quote_received();
                self.emit(UpstreamEvent::Quote(quote)).await;
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    error = %e,
                    "Dropping undecodable upstream message"
                );
                metrics::record_decode_error();
            }
        }
    }

    fn lost(&self) -> LinkEnd {
        self.state.transition(self.session_id, ConnectionState::Closed);
        LinkEnd::Lost
    }

    async fn shutdown(&self, mut link: D::Link) -> CloseOutcome {
        match tokio::time::timeout(self.config.close_timeout, link.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    error = %e,
                    "Upstream close failed"
                );
            }
            Err(_) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    timeout_ms = self.config.close_timeout.as_millis(),
                    "Upstream close timed out, dropping connection"
                );
            }
        }
        self.state.transition(self.session_id, ConnectionState::Closed);
        tracing::info!(session_id = %self.session_id, "Upstream connection closed");
        CloseOutcome::Closed
    }

    /// Deliver an event unless the owner has cancelled or gone away.
    async fn emit(&self, event: UpstreamEvent) {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {}
            result = self.events.send(event) => {
                if result.is_err() {
                    tracing::trace!(session_id = %self.session_id, "Session event channel closed");
                }
            }
        }
    }
}
