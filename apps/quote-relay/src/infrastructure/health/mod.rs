//! Liveness and Metrics Endpoints
//!
//! - `GET /` - Fixed plain-text liveness message
//! - `GET /metrics` - Prometheus metrics in text format

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::infrastructure::metrics::get_metrics_handle;

/// Body returned by the liveness endpoint.
pub const LIVENESS_BODY: &str = "Quote relay running with Twelve Data WebSocket.";

/// `GET /`
pub async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, LIVENESS_BODY)
}

/// `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    render_metrics(get_metrics_handle())
}

type MetricsResponse = (StatusCode, [(&'static str, &'static str); 1], String);

fn render_metrics(handle: Option<PrometheusHandle>) -> MetricsResponse {
    handle.map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn metrics_unavailable_before_init() {
        let (status, headers, body) = render_metrics(None);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(headers[0].1, "text/plain");
        assert_eq!(body, "Metrics not initialized");
    }

    #[test]
    fn metrics_rendered_from_handle() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, crate::infrastructure::metrics::record_reconnect);

        let (status, headers, body) = render_metrics(Some(handle));
        assert_eq!(status, StatusCode::OK);
        assert!(headers[0].1.starts_with("text/plain; version=0.0.4"));
        assert!(body.contains("quote_relay_reconnects_total"));
    }
}
