use axum::{Json, Router, extract::Path, extract::State, routing::get};
use serde_json::Value;

use crate::error::{AppError, ServiceError};
use crate::state::SharedState;
use crate::state::field::FieldPath;
use crate::state::game::GameState;

/// Return the full game document. Reconnecting clients use this (or the
/// `get_server_state` event) to reconcile after missed broadcasts.
pub async fn full_state(State(state): State<SharedState>) -> Json<GameState> {
    Json(state.store().snapshot())
}

/// Read a single field by its dot-path spelling (e.g. `teams.3.score`).
pub async fn read_field(
    State(state): State<SharedState>,
    Path(path): Path<String>,
) -> Result<Json<Value>, AppError> {
    let field: FieldPath = path.parse().map_err(ServiceError::from)?;
    let value = state.store().get_field(&field).map_err(ServiceError::from)?;
    Ok(Json(value))
}

/// Configure the state snapshot endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/state", get(full_state))
        .route("/state/field/{path}", get(read_field))
}
