//! Dashboard: Axum web server for health checks and event delivery.
//!
//! Serves the agent's health contract, a status summary, recent errors,
//! and an endpoint through which upstream agents deliver events.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use routes::AppState;

/// Start the dashboard web server.
///
/// Binds before returning so a port conflict surfaces as an error;
/// serving then continues on a background task.
pub async fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard server listening on http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/status", get(routes::get_status))
        .route("/api/errors", get(routes::get_errors))
        .route("/api/events", post(routes::post_events))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
