//! HTTP control server

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::UiConfig;
use crate::coordinator::SharedCoordinator;
use crate::error::{Error, Result};

use super::handlers;

/// State shared by every handler
pub struct AppState {
    pub coordinator: SharedCoordinator,
}

pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: UiConfig, coordinator: SharedCoordinator) -> Self {
        Self {
            config,
            state: Arc::new(AppState { coordinator }),
        }
    }

    /// Build the API router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(handlers::get_status))
            .route("/api/sessions", get(handlers::get_sessions))
            .route("/api/sessions/:index", get(handlers::get_session))
            .route("/api/focus", post(handlers::set_focus))
            .route("/api/slots/:slot/select", post(handlers::select_slot))
            .route("/api/pause", post(handlers::pause))
            .route("/api/resume", post(handlers::resume))
            .route("/api/stop", post(handlers::stop))
            .with_state(self.state.clone())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    pub fn address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.bind_address, self.config.http_port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid UI bind address: {}", e)))
    }

    /// Serve until the task is aborted
    pub async fn run(self) -> Result<()> {
        let addr = self.address()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Control API listening on http://{}", addr);

        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Serve on a background task
    pub fn start_background(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!("Control API stopped: {}", e);
            }
        })
    }
}
