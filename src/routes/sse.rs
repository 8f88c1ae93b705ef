use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/rooms/{room_id}/events",
    tag = "sse",
    params(("room_id" = String, Path, description = "Four-letter room code")),
    responses(
        (status = 200, description = "Room snapshots as they are committed", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown room")
    )
)]
/// Stream every committed snapshot of a room.
pub async fn room_stream(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = sse_service::subscribe_room(&state, &room_id).await?;
    info!(room = %room_id, "new room SSE connection");
    Ok(sse_service::to_sse_stream(subscription))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms/{room_id}/events", get(room_stream))
}
