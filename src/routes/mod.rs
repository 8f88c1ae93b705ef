use axum::Router;

use crate::state::SharedState;

/// Player actions.
pub mod actions;
/// Swagger UI and OpenAPI document.
pub mod docs;
/// Health check.
pub mod health;
/// Room lifecycle.
pub mod rooms;
/// Room change streams.
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(rooms::router())
        .merge(actions::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
