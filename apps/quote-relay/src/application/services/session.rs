//! Fan-out Session
//!
//! Binds one downstream client to its own upstream connector and relays every
//! decoded quote to that client under the [`STOCK_DATA_EVENT`] name.
//!
//! Each session has a private event channel, so a quote can only ever reach
//! the client whose connector produced it. Detaching stops forwarding first
//! and then closes the connector, so the upstream never outlives the session.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ClientInfo, ClientSink, UpstreamDialer};
use crate::domain::quote::Quote;
use crate::domain::session::SessionId;
use crate::infrastructure::metrics;
use crate::infrastructure::twelvedata::{
    CloseOutcome, ConnectorConfig, UpstreamConnector, UpstreamEvent,
};

/// Event name under which quotes are delivered to clients.
pub const STOCK_DATA_EVENT: &str = "stockData";

/// Summary of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    /// Quotes successfully delivered to the client.
    pub quotes_forwarded: u64,
    /// Deliveries that failed on the client transport.
    pub send_failures: u64,
    /// What closing the upstream connector did.
    pub close: CloseOutcome,
}

impl SessionReport {
    const fn new() -> Self {
        Self {
            quotes_forwarded: 0,
            send_failures: 0,
            close: CloseOutcome::NotOpen,
        }
    }
}

/// A live session's relay task.
pub struct ClientSession<S: ClientSink> {
    id: SessionId,
    client: S,
    connector: UpstreamConnector,
    events: mpsc::Receiver<UpstreamEvent>,
    detach: CancellationToken,
}

impl<S: ClientSink> ClientSession<S> {
    /// Open the session's upstream connector and start relaying to `client`.
    #[must_use]
    pub fn attach<D: UpstreamDialer>(
        id: SessionId,
        info: &ClientInfo,
        client: S,
        config: Arc<ConnectorConfig>,
        dialer: Arc<D>,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::channel(config.event_capacity.max(1));
        let connector = UpstreamConnector::open(id, config, dialer, tx);
        let detach = CancellationToken::new();

        tracing::info!(
            session_id = %id,
            peer = ?info.peer,
            origin = info.origin.as_deref().unwrap_or("-"),
            "Client session attached"
        );

        let session = Self {
            id,
            client,
            connector,
            events: rx,
            detach: detach.clone(),
        };

        SessionHandle {
            id,
            detach,
            task: Some(tokio::spawn(session.run())),
        }
    }

    async fn run(mut self) -> SessionReport {
        let mut report = SessionReport::new();

        loop {
            let event = tokio::select! {
                biased;
                () = self.detach.cancelled() => break,
                event = self.events.recv() => event,
            };

            match event {
                Some(UpstreamEvent::Quote(quote)) => {
                    if !self.forward(&quote, &mut report).await {
                        break;
                    }
                }
                Some(UpstreamEvent::Error(error)) => {
                    tracing::debug!(session_id = %self.id, %error, "Upstream reported error");
                }
                Some(event) => {
                    tracing::trace!(session_id = %self.id, ?event, "Upstream event");
                }
                None => {
                    // Connector finished on its own; stay attached until the client leaves.
                    self.detach.cancelled().await;
                    break;
                }
            }
        }

        report.close = self.connector.close().await;

        tracing::info!(
            session_id = %self.id,
            quotes_forwarded = report.quotes_forwarded,
            send_failures = report.send_failures,
            upstream = ?report.close,
            "Client session detached"
        );

        report
    }

    /// Deliver one quote. Returns `false` if the session was detached meanwhile.
    async fn forward(&mut self, quote: &Quote, report: &mut SessionReport) -> bool {
        let sent = tokio::select! {
            biased;
            () = self.detach.cancelled() => return false,
            sent = self.client.emit(STOCK_DATA_EVENT, quote.payload()) => sent,
        };

        match sent {
            Ok(()) => {
                report.quotes_forwarded += 1;
                metrics::record_quote_forwarded();
                tracing::debug!(
                    session_id = %self.id,
                    symbol = quote.symbol().unwrap_or("-"),
                    price = ?quote.price(),
                    payload = %quote.payload(),
                    "Forwarded quote to client"
                );
            }
            Err(e) => {
                report.send_failures += 1;
                metrics::record_client_send_failure();
                tracing::warn!(
                    session_id = %self.id,
                    error = %e,
                    "Failed to deliver quote to client"
                );
            }
        }

        true
    }
}

/// Owner's handle to a running session.
///
/// Dropping the handle detaches the session without waiting for cleanup.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    detach: CancellationToken,
    task: Option<JoinHandle<SessionReport>>,
}

impl SessionHandle {
    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Stop forwarding, close the upstream connector and wait for both.
    pub async fn detach(mut self) -> SessionReport {
        self.detach.cancel();

        let Some(task) = self.task.take() else {
            return SessionReport::new();
        };

        match task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(session_id = %self.id, error = %e, "Session task failed");
                SessionReport::new()
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.detach.cancel();
    }
}
