//! Health check endpoints.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use serde_json::{Value, json};
use tracing::warn;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn ready(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if let Err(e) = jobcast_db::ping(&state.pool).await {
        warn!(error = %e, "Readiness check failed");
        return Err(ApiError::Unavailable("database unavailable".to_string()));
    }

    let observers = state.hub.observer_count().await;
    Ok(Json(json!({ "status": "ready", "observers": observers })))
}
