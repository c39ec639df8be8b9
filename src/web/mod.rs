//! Web layer module
//!
//! Thin axum handlers over [`ColorService`]:
//! - `GET /colors?max=N&deadline=20s` streams NDJSON results as they resolve
//! - `GET /cached?max=N` lists cached colors, newest first
//! - `GET /health` reports cache and worker pool counters

use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::WebConfig;
use crate::errors::{AppError, AppResult};
use crate::services::ColorService;

pub mod handlers;
pub mod responses;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ColorService>,
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: &WebConfig, service: Arc<ColorService>) -> AppResult<Self> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| {
                AppError::configuration(format!(
                    "invalid listen address {}:{}: {e}",
                    config.host, config.port
                ))
            })?;

        Ok(Self {
            app: Self::router(service),
            addr,
        })
    }

    /// Routes with shared state and request tracing
    pub fn router(service: Arc<ColorService>) -> Router {
        Router::new()
            .route("/colors", get(handlers::colors::stream_colors))
            .route("/cached", get(handlers::colors::cached_colors))
            .route("/health", get(handlers::health::health_check))
            .layer(TraceLayer::new_for_http())
            .with_state(AppState { service })
    }

    /// Serve until `cancellation_token` fires
    pub async fn serve_with_cancellation(self, cancellation_token: CancellationToken) -> AppResult<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("Listening on http://{}", listener.local_addr()?);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move {
                cancellation_token.cancelled().await;
                info!("Web server received cancellation signal, shutting down gracefully");
            })
            .await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}
