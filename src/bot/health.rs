//! `/health` route served next to the webhook.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::error;

use crate::database::{StoreResult, UserStore};

/// Router answering `GET /health` with the store status.
pub fn router(users: Arc<dyn UserStore>) -> Router {
    Router::new().route("/health", get(health)).with_state(users)
}

async fn health(State(users): State<Arc<dyn UserStore>>) -> (StatusCode, Json<Value>) {
    report(users.ping().await)
}

fn report(ping: StoreResult<()>) -> (StatusCode, Json<Value>) {
    match ping {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "connected" })),
        ),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "database": "unreachable" })),
            )
        }
    }
}
