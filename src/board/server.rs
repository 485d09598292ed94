use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use super::api::{self, AppState};
use super::build_backend;
use super::clock::SystemClock;
use super::recent::RecentlyViewed;
use crate::config::BoardConfig;

/// Configuration for the board server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3142,
            dev_mode: false,
        }
    }
}

impl ServerConfig {
    /// Server settings from `[server]`. Dev mode binds every interface.
    pub fn from_board_config(config: &BoardConfig, port: Option<u16>, dev_mode: bool) -> Self {
        let host = if dev_mode {
            "0.0.0.0".to_string()
        } else {
            config.toml.server.host.clone()
        };
        Self {
            host,
            port: port.unwrap_or(config.toml.server.port),
            dev_mode,
        }
    }
}

/// Build the full application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router().fallback(not_found).with_state(state)
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        axum::Json(serde_json::json!({"error": "No such route"})),
    )
}

/// Start the board server.
pub async fn start_server(board: &BoardConfig, config: ServerConfig) -> Result<()> {
    let backend = build_backend(board, Arc::new(SystemClock))?;
    let recent = RecentlyViewed::open(&board.recent_dir()?);

    let state = Arc::new(AppState {
        backend,
        user: board.user(),
        recent: Mutex::new(recent),
    });

    let mut app = build_router(state);

    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(%local_addr, user = %board.user().name, role = %board.user().role, "server listening");
    println!("Issue board running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}
