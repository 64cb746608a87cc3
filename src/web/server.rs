use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::AppState;

use super::handlers;

/// Build the API router. Split out from [`run`] so tests can drive it.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/trains", get(handlers::get_trains))
        .route("/api/trains/{trip_id}", get(handlers::get_train))
        .route("/api/status", get(handlers::get_status))
        .route("/api/healthz", get(handlers::healthz))
        // Map clients are served from another origin
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .with_state(state)
}

/// Run the axum web server on the configured address until shutdown.
pub async fn run(state: Arc<AppState>) {
    let bind = state.config.load().bind;
    let app = router(state.clone());

    let listener = match tokio::net::TcpListener::bind(bind).await {
        Ok(l) => {
            info!("[WEB] Server listening on http://{}", bind);
            l
        }
        Err(e) => {
            tracing::error!("[WEB] Failed to bind {}: {}", bind, e);
            return;
        }
    };

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .ok();

    info!("[WEB] Server stopped");
}
