#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Quote Relay - Per-Client Market Quote Fan-out
//!
//! A WebSocket relay that gives every downstream client its own Twelve Data
//! price stream. Each connection is subscribed to a fixed instrument set and
//! every decoded provider message is forwarded to the owning client on the
//! `stockData` event.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `quote`: Quotes, instrument sets, subscription requests
//!   - `session`: Session ids and the upstream connection state machine
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Upstream dialer/link, client sink, admission policy
//!   - `services`: Fan-out sessions, session registry, admission policies
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `twelvedata`: Upstream connector, codec, transport, reconnect policy
//!   - `downstream`: Client WebSocket handler
//!   - `server`: HTTP listener, routes and CORS
//!   - `config`: Environment configuration
//!   - `health`: Liveness and metrics endpoints
//!
//! # Data Flow
//!
//! ```text
//! Twelve Data WS ──► Connector A ──► Session A ──► Client A
//! Twelve Data WS ──► Connector B ──► Session B ──► Client B
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core relay types with no external I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::quote::{DEFAULT_SYMBOLS, InstrumentSet, Quote, SubscribeRequest};
pub use domain::session::{ConnectionState, SessionId};

// Ports
pub use application::ports::{
    Admission, AdmissionPolicy, ClientInfo, ClientSink, ClientSinkError, UpstreamDialer,
    UpstreamError, UpstreamFrame, UpstreamLink,
};

// Services
pub use application::services::{
    AdmissionError, AlwaysAdmit, ClientSession, MaxSessions, STOCK_DATA_EVENT, SessionHandle,
    SessionRegistry, SessionReport,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, CorsOrigins, Credentials, RelayConfig};

// Upstream adapter
pub use infrastructure::twelvedata::{
    CloseOutcome, ConnectorConfig, ReconnectConfig, TungsteniteDialer, UpstreamConnector,
    UpstreamEvent,
};

// Server
pub use infrastructure::health::LIVENESS_BODY;
pub use infrastructure::server::{RelayServer, ServerError, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
