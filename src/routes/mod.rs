//! HTTP surface: WebSocket upgrade, SSE mirror, state snapshot, health.

use axum::Router;

use crate::state::SharedState;

pub mod health;
pub mod sse;
pub mod state;
pub mod ws;

/// Compose all route trees, wiring in the shared state.
pub fn router(shared: SharedState) -> Router<()> {
    health::router()
        .merge(sse::router())
        .merge(ws::router())
        .merge(state::router())
        .with_state(shared)
}
