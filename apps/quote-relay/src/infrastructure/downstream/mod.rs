//! Downstream WebSocket Adapter
//!
//! Serves `GET /ws`. Every upgraded connection becomes one relay session.
//! Quotes are written as text frames carrying a JSON envelope:
//!
//! ```json
//! {"event":"stockData","data":{"event":"price","symbol":"AAPL","price":189.71}}
//! ```
//!
//! Frames sent by the client are ignored. The session is detached when the
//! client closes, the socket errors, or the server shuts down.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::application::ports::{ClientInfo, ClientSink, ClientSinkError, UpstreamDialer};
use crate::application::services::AdmissionError;
use crate::infrastructure::server::RelayState;

/// Wire format of one event sent to a client.
#[derive(Debug, Serialize)]
pub struct ClientEnvelope<'a> {
    /// Event name.
    pub event: &'a str,
    /// Event payload.
    pub data: &'a Value,
}

/// Send half of a downstream WebSocket.
pub struct WsClientSink {
    sink: SplitSink<WebSocket, Message>,
}

impl WsClientSink {
    /// Wrap the send half of an upgraded socket.
    #[must_use]
    pub const fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl ClientSink for WsClientSink {
    async fn emit(&mut self, event: &str, payload: &Value) -> Result<(), ClientSinkError> {
        let text = serde_json::to_string(&ClientEnvelope {
            event,
            data: payload,
        })?;

        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ClientSinkError::Send(e.to_string()))
    }
}

/// `GET /ws` upgrade handler.
pub async fn ws_handler<D: UpstreamDialer>(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<RelayState<D>>,
) -> Response {
    let info = ClientInfo {
        peer: Some(peer),
        origin: headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
    };

    // Admission runs before the upgrade so a rejected client never holds a socket.
    if let Err(AdmissionError::Rejected(reason)) = state.registry.check_admission(&info) {
        return (StatusCode::SERVICE_UNAVAILABLE, reason).into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, info, state))
}

async fn handle_socket<D: UpstreamDialer>(
    socket: WebSocket,
    info: ClientInfo,
    state: RelayState<D>,
) {
    let (sink, mut stream) = socket.split();

    let handle = match state.registry.accept_client(&info, WsClientSink::new(sink)) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::debug!(peer = ?info.peer, error = %e, "Dropping rejected client socket");
            return;
        }
    };
    let session_id = handle.id();

    loop {
        let frame = tokio::select! {
            biased;
            () = state.shutdown.cancelled() => break,
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(session_id = %session_id, error = %e, "Client socket error");
                break;
            }
        }
    }

    state.registry.on_client_transport_close(handle).await;
}
