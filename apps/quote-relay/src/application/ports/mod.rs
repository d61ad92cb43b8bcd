//! Port Interfaces
//!
//! Defines the interfaces (ports) between the relay services and the outside
//! world. Infrastructure adapters implement these; tests substitute in-memory
//! doubles.
//!
//! ## Driven Ports (Outbound)
//!
//! - `UpstreamDialer` / `UpstreamLink`: the provider WebSocket
//! - `ClientSink`: the downstream client connection
//!
//! ## Policy Ports
//!
//! - `AdmissionPolicy`: decides whether a new client gets a session

use std::net::SocketAddr;

use async_trait::async_trait;
use serde_json::Value;

// =============================================================================
// Upstream
// =============================================================================

/// A frame received from the upstream transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamFrame {
    /// UTF-8 text payload.
    Text(String),
    /// Binary payload.
    Binary(Vec<u8>),
    /// Ping that must be answered with a pong.
    Ping(Vec<u8>),
    /// Pong reply.
    Pong,
    /// Remote close frame.
    Close,
}

/// Upstream transport errors.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The connection could not be established.
    #[error("upstream connection failed: {0}")]
    ConnectFailed(String),

    /// The established transport failed.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// The transport is already closed.
    #[error("upstream connection closed")]
    Closed,
}

/// Opens upstream connections.
#[async_trait]
pub trait UpstreamDialer: Send + Sync + 'static {
    /// Connection type produced by this dialer.
    type Link: UpstreamLink;

    /// Open a streaming connection to `url`.
    ///
    /// Must be cancel-safe: dropping the future abandons the attempt.
    async fn dial(&self, url: &str) -> Result<Self::Link, UpstreamError>;
}

/// One established upstream connection.
#[async_trait]
pub trait UpstreamLink: Send + 'static {
    /// Send a text frame.
    async fn send_text(&mut self, text: String) -> Result<(), UpstreamError>;

    /// Answer a ping.
    async fn send_pong(&mut self, payload: Vec<u8>) -> Result<(), UpstreamError>;

    /// Next inbound frame; `None` once the stream has ended.
    ///
    /// Must be cancel-safe.
    async fn next_frame(&mut self) -> Option<Result<UpstreamFrame, UpstreamError>>;

    /// Close the transport.
    async fn close(&mut self) -> Result<(), UpstreamError>;
}

// =============================================================================
// Downstream
// =============================================================================

/// Downstream send errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientSinkError {
    /// The event could not be encoded.
    #[error("client encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The client transport rejected the frame.
    #[error("client send failed: {0}")]
    Send(String),
}

/// Send half of a downstream client connection.
#[async_trait]
pub trait ClientSink: Send + 'static {
    /// Emit `payload` to the client under the named event.
    async fn emit(&mut self, event: &str, payload: &Value) -> Result<(), ClientSinkError>;
}

// =============================================================================
// Admission
// =============================================================================

/// What the server knows about a connecting client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// Remote socket address, when the transport exposes it.
    pub peer: Option<SocketAddr>,
    /// `Origin` header of the upgrade request.
    pub origin: Option<String>,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Open a session for the client.
    Admit,
    /// Refuse the client with a reason.
    Reject(String),
}

/// Decides whether a connecting client gets a session.
#[cfg_attr(test, mockall::automock)]
pub trait AdmissionPolicy: Send + Sync {
    /// Evaluate a client given the number of sessions currently live.
    fn admit(&self, client: &ClientInfo, active_sessions: usize) -> Admission;
}
