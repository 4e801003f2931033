pub mod request_id;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::controllers::{audio::AudioController, health};
use crate::infrastructure::db::DbPool;
use self::request_id::request_id_middleware;

/// Start the HTTP server with all routes configured
pub async fn start_http_server(
    pool: Arc<DbPool>,
    host: &str,
    port: u16,
    audio_controller: Arc<AudioController>,
) -> Result<(), Box<dyn std::error::Error>> {
    // Audio routes
    let audio_routes = Router::new()
        .route("/api/audio/merged", get(AudioController::get_merged))
        .route("/api/audio/last/:lang", get(AudioController::get_last))
        .route("/api/audio/:id/:lang", get(AudioController::get_segment))
        .with_state(audio_controller.clone());

    // Build application routes
    let app = Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::health_ready))
        .with_state(pool.clone())
        .merge(audio_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
