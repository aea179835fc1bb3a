use axum::{extract::State, Json};
use chrono::Utc;
use shared::Health;

use crate::AppState;

/// Liveness only; never touches the database.
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "OK".to_string(),
        timestamp: Utc::now(),
        database: state.database.clone(),
        host: state.host.clone(),
    })
}
