//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Twelve Data upstream WebSocket adapter.
pub mod twelvedata;

/// Downstream client WebSocket adapter.
pub mod downstream;

/// HTTP listener, routing and CORS.
pub mod server;

/// Configuration loading.
pub mod config;

/// Liveness and metrics endpoints.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
