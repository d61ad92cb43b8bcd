//! WebSocket Transport
//!
//! `tokio-tungstenite` implementation of the upstream dialer and link ports.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{UpstreamDialer, UpstreamError, UpstreamFrame, UpstreamLink};

/// Dials the provider over `ws://` or `wss://`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteDialer;

impl TungsteniteDialer {
    /// Create a new dialer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UpstreamDialer for TungsteniteDialer {
    type Link = TungsteniteLink;

    async fn dial(&self, url: &str) -> Result<Self::Link, UpstreamError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| UpstreamError::ConnectFailed(e.to_string()))?;

        Ok(TungsteniteLink { stream })
    }
}

/// An established provider WebSocket.
#[derive(Debug)]
pub struct TungsteniteLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl UpstreamLink for TungsteniteLink {
    async fn send_text(&mut self, text: String) -> Result<(), UpstreamError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(map_ws_error)
    }

    async fn send_pong(&mut self, payload: Vec<u8>) -> Result<(), UpstreamError> {
        self.stream
            .send(Message::Pong(payload.into()))
            .await
            .map_err(map_ws_error)
    }

    async fn next_frame(&mut self) -> Option<Result<UpstreamFrame, UpstreamError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(Message::Text(text)) => UpstreamFrame::Text(text.as_str().to_owned()),
                Ok(Message::Binary(data)) => UpstreamFrame::Binary(data.to_vec()),
                Ok(Message::Ping(data)) => UpstreamFrame::Ping(data.to_vec()),
                Ok(Message::Pong(_)) => UpstreamFrame::Pong,
                Ok(Message::Close(_)) => UpstreamFrame::Close,
                // Raw frames are never yielded when reading.
                Ok(Message::Frame(_)) => continue,
                Err(e) => return Some(Err(map_ws_error(e))),
            };
            return Some(Ok(frame));
        }
    }

    async fn close(&mut self) -> Result<(), UpstreamError> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(map_ws_error(e)),
        }
    }
}

fn map_ws_error(error: WsError) -> UpstreamError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => UpstreamError::Closed,
        other => UpstreamError::Transport(other.to_string()),
    }
}
