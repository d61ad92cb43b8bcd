//! Prometheus Metrics Module
//!
//! Exposes relay metrics in Prometheus text format at `/metrics`.
//!
//! # Metrics Categories
//!
//! - **Quotes**: Upstream messages received, forwarded and dropped
//! - **Connections**: Active sessions and open upstream connections
//! - **Errors**: Upstream failures, client send failures, rejected sessions

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: parking_lot::Mutex<Option<PrometheusHandle>> =
    parking_lot::Mutex::new(None);

/// Install the Prometheus recorder and return its handle.
///
/// Repeated calls return the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    let mut slot = PROMETHEUS_HANDLE.lock();
    if let Some(handle) = slot.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    *slot = Some(handle.clone());
    Ok(handle)
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.lock().clone()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "quote_relay_quotes_received_total",
        "Total decoded messages received from the upstream provider"
    );
    describe_counter!(
        "quote_relay_quotes_forwarded_total",
        "Total messages delivered to downstream clients"
    );
    describe_counter!(
        "quote_relay_decode_errors_total",
        "Total upstream frames dropped because they were not valid JSON"
    );

    describe_gauge!(
        "quote_relay_active_sessions",
        "Number of attached downstream sessions"
    );
    describe_gauge!(
        "quote_relay_upstream_connections",
        "Number of open upstream connections"
    );

    describe_counter!(
        "quote_relay_upstream_errors_total",
        "Total upstream connection errors by stage"
    );
    describe_counter!(
        "quote_relay_client_send_failures_total",
        "Total failed deliveries to downstream clients"
    );
    describe_counter!(
        "quote_relay_reconnects_total",
        "Total upstream reconnection attempts"
    );
    describe_counter!(
        "quote_relay_sessions_rejected_total",
        "Total downstream connections refused by the admission policy"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a decoded upstream message.
pub fn record_quote_received() {
    counter!("quote_relay_quotes_received_total").increment(1);
}

/// Record a message delivered to a client.
pub fn record_quote_forwarded() {
    counter!("quote_relay_quotes_forwarded_total").increment(1);
}

/// Record an upstream frame that failed to decode.
pub fn record_decode_error() {
    counter!("quote_relay_decode_errors_total").increment(1);
}

/// Record an upstream error at the given stage (`connect`, `subscribe`, `transport`).
pub fn record_upstream_error(stage: &'static str) {
    counter!("quote_relay_upstream_errors_total", "stage" => stage).increment(1);
}

/// Record a failed delivery to a client.
pub fn record_client_send_failure() {
    counter!("quote_relay_client_send_failures_total").increment(1);
}

/// Record an upstream reconnection attempt.
pub fn record_reconnect() {
    counter!("quote_relay_reconnects_total").increment(1);
}

/// Record a refused downstream connection.
pub fn record_session_rejected() {
    counter!("quote_relay_sessions_rejected_total").increment(1);
}

/// A downstream session was attached.
pub fn session_attached() {
    gauge!("quote_relay_active_sessions").increment(1.0);
}

/// A downstream session was detached.
pub fn session_detached() {
    gauge!("quote_relay_active_sessions").decrement(1.0);
}

/// An upstream connection reached the open state.
pub fn upstream_opened() {
    gauge!("quote_relay_upstream_connections").increment(1.0);
}

/// An open upstream connection ended.
pub fn upstream_closed() {
    gauge!("quote_relay_upstream_connections").decrement(1.0);
}

// =============================================================================
// Tests
// =============================================================================
