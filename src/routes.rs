use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;
use crate::websocket;

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(websocket::websocket_handler))
        .route("/api/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "active_sessions": state.sessions.len(),
    }))
}
