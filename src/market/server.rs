use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::api::{self, ApiError, AppState, SharedState};
use super::auth::AuthConfig;
use super::db::{DbHandle, MarketDb};
use super::ws;

/// Configuration for the marketplace server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
    /// Built frontend assets. When set, unknown paths fall back to its `index.html`.
    pub static_dir: Option<PathBuf>,
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            db_path: PathBuf::from("data/freelancie.db"),
            dev_mode: false,
            static_dir: None,
            auth: AuthConfig::default(),
        }
    }
}

/// Build the full application router with API, WebSocket and optional SPA serving.
pub fn build_router(state: SharedState, static_dir: Option<&Path>) -> Router {
    let router = api::api_router().route("/ws", get(ws::ws_handler));

    let router = match static_dir {
        Some(dir) => router.fallback_service(
            ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
        ),
        None => router.route("/", get(api::api_index)).fallback(route_not_found),
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn route_not_found() -> ApiError {
    ApiError::NotFound("Route not found".into())
}

/// Start the marketplace server.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let db = MarketDb::new(&config.db_path).context("Failed to initialize marketplace database")?;
    let state = Arc::new(AppState::new(DbHandle::new(db), config.auth.clone()));

    let mut app = build_router(state, config.static_dir.as_deref());
    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        %local_addr,
        db_path = %config.db_path.display(),
        dev_mode = config.dev_mode,
        "Freelancie API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("received Ctrl+C, shutting down"),
            Err(e) => {
                tracing::error!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
