use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
/// Liveness payload.
pub struct HealthStatus {
    /// Always `"ok"` while the process serves requests.
    pub status: &'static str,
    /// Number of connected WebSocket clients.
    pub clients: usize,
}

/// Report process liveness and the connected client count.
pub async fn health(State(state): State<SharedState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        clients: state.clients().len(),
    })
}

/// Configure the health endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/health", get(health))
}
