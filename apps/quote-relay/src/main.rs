//! Quote Relay Binary
//!
//! Starts the per-client market quote relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin quote-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `TWELVEDATA_API_KEY`: Twelve Data API key
//!
//! ## Optional
//! - `PORT`: HTTP/WebSocket listen port (default: 5001)
//! - `RELAY_UPSTREAM_URL`: Provider stream URL (default: wss://ws.twelvedata.com/v1/quotes/price)
//! - `RELAY_SYMBOLS`: Comma-separated instruments (default: AAPL,BTC/USD,ETH/USD,EUR/USD,GBP/USD,USD/JPY,USD/INR)
//! - `RELAY_CORS_ORIGINS`: `*` or comma-separated origins (default: *)
//! - `RELAY_MAX_SESSIONS`: Concurrent session cap, 0 for unlimited (default: 0)
//! - `RELAY_EVENT_CAPACITY`: Per-session event buffer (default: 1024)
//! - `RELAY_UPSTREAM_MAX_RECONNECTS`: Upstream reconnect budget per session (default: 0)
//! - `RELAY_RECONNECT_DELAY_INITIAL_MS`: First reconnect delay (default: 500)
//! - `RELAY_RECONNECT_DELAY_MAX_SECS`: Reconnect delay cap (default: 30)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: quote-relay)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quote_relay::infrastructure::server::{RelayServer, router};
use quote_relay::infrastructure::telemetry;
use quote_relay::{RelayConfig, SessionRegistry, TungsteniteDialer, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting quote relay");

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    log_config(&config);

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable");
    }

    let shutdown_token = CancellationToken::new();

    let registry = Arc::new(SessionRegistry::from_relay_config(
        &config,
        TungsteniteDialer::new(),
    ));
    let app = router(registry, &config.cors, shutdown_token.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let server = RelayServer::bind(addr).await?;

    let server_shutdown = shutdown_token.clone();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.serve(app, server_shutdown).await {
            tracing::error!(error = %e, "Relay server error");
        }
    });

    tracing::info!("Quote relay ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, server_task)
        .await
        .is_err()
    {
        tracing::warn!("Graceful shutdown timed out");
    }

    tracing::info!("Quote relay stopped");

    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        port = config.server.port,
        symbols = %config.upstream.instruments,
        max_sessions = config.server.max_sessions,
        max_reconnects = config.upstream.reconnect.max_attempts,
        "Configuration loaded"
    );
    tracing::debug!(
        endpoint = %config.upstream_endpoint(),
        cors = ?config.cors,
        event_capacity = config.upstream.event_capacity,
        "Upstream settings"
    );
}

/// Load .env from the current directory or the nearest ancestor that has one.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
