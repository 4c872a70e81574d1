pub mod admin;
pub mod auth;
pub mod channels;
pub mod messages;
pub mod servers;
pub mod setup;
pub mod users;
pub mod ws;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::db;
use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    match db::health_check(state.store.pool()).await {
        Ok(()) => Json(json!({ "status": "ok" })),
        Err(_) => Json(json!({ "status": "degraded" })),
    }
}
