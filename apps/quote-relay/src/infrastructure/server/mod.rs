//! HTTP Server
//!
//! One listener serves the liveness endpoint, Prometheus metrics and the
//! downstream WebSocket, behind a CORS layer.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::application::ports::UpstreamDialer;
use crate::application::services::SessionRegistry;
use crate::infrastructure::config::CorsOrigins;
use crate::infrastructure::downstream::ws_handler;
use crate::infrastructure::health::{liveness_handler, metrics_handler};

/// State shared by the HTTP handlers.
pub struct RelayState<D: UpstreamDialer> {
    /// Session admission and accounting.
    pub registry: Arc<SessionRegistry<D>>,
    /// Cancelled when the server shuts down.
    pub shutdown: CancellationToken,
}

impl<D: UpstreamDialer> Clone for RelayState<D> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Build the relay router.
pub fn router<D: UpstreamDialer>(
    registry: Arc<SessionRegistry<D>>,
    cors: &CorsOrigins,
    shutdown: CancellationToken,
) -> Router {
    Router::new()
        .route("/", get(liveness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(ws_handler::<D>))
        .layer(cors_layer(cors))
        .with_state(RelayState { registry, shutdown })
}

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST]);

    match origins {
        CorsOrigins::Any => layer.allow_origin(Any),
        CorsOrigins::List(list) => {
            let values: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            layer.allow_origin(AllowOrigin::list(values))
        }
    }
}

/// Bound HTTP listener.
#[derive(Debug)]
pub struct RelayServer {
    listener: TcpListener,
}

impl RelayServer {
    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::BindFailed` if the address is unavailable.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(addr, e.to_string()))?;
        Ok(Self { listener })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ServerFailed` if the socket address is unavailable.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::ServerFailed(e.to_string()))
    }

    /// Serve `app` until `shutdown` is cancelled and open connections drain.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ServerFailed` if the HTTP server fails.
    pub async fn serve(self, app: Router, shutdown: CancellationToken) -> Result<(), ServerError> {
        let addr = self.local_addr()?;
        tracing::info!(%addr, "Relay server listening");

        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Relay server stopped");
        Ok(())
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind the listener.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
