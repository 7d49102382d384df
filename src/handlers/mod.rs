pub mod demo;
pub mod merchant;
pub mod payments;
pub mod wallet;

use axum::Json;
use serde_json::{json, Value};

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
