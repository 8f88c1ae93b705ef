use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dao::models::RoomEntity,
    dto::{
        actions::PlayerRequest,
        rooms::{CreateRoomRequest, JoinRoomRequest, RoomResponse},
    },
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Room lifecycle endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{room_id}", get(get_room).delete(delete_room))
        .route("/rooms/{room_id}/players", post(join_room))
        .route("/rooms/{room_id}/start", post(start_game))
        .route("/rooms/{room_id}/force-advance", post(force_advance))
        .route("/rooms/{room_id}/reset", post(reset_game))
}

/// Open a new room; the caller becomes its host.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created", body = RoomResponse),
        (status = 400, description = "Invalid payload"),
        (status = 503, description = "Room store unavailable")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateRoomRequest>>,
) -> Result<(StatusCode, Json<RoomResponse>), AppError> {
    let created = room_service::create_room(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Current snapshot of a room.
#[utoipa::path(
    get,
    path = "/rooms/{room_id}",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Four-letter room code")),
    responses(
        (status = 200, description = "Room snapshot", body = RoomEntity),
        (status = 404, description = "Unknown room")
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomEntity>, AppError> {
    Ok(Json(room_service::get_room(&state, &room_id).await?))
}

/// Join a room that is still in its lobby.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/players",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Four-letter room code")),
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Player joined", body = RoomEntity),
        (status = 409, description = "Game already started or name taken")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Valid(Json(payload)): Valid<Json<JoinRoomRequest>>,
) -> Result<Json<RoomEntity>, AppError> {
    Ok(Json(room_service::join_room(&state, &room_id, payload).await?))
}

/// Host starts the first round.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/start",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Four-letter room code")),
    request_body = PlayerRequest,
    responses(
        (status = 200, description = "Round one started", body = RoomEntity),
        (status = 401, description = "Caller is not the host"),
        (status = 409, description = "Lobby not ready")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Valid(Json(payload)): Valid<Json<PlayerRequest>>,
) -> Result<Json<RoomEntity>, AppError> {
    Ok(Json(room_service::start_game(&state, &room_id, payload).await?))
}

/// Host forces the next transition regardless of missing votes or decisions.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/force-advance",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Four-letter room code")),
    request_body = PlayerRequest,
    responses(
        (status = 200, description = "Room after the forced transition", body = RoomEntity),
        (status = 401, description = "Caller is not the host"),
        (status = 409, description = "Nothing to advance")
    )
)]
pub async fn force_advance(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Valid(Json(payload)): Valid<Json<PlayerRequest>>,
) -> Result<Json<RoomEntity>, AppError> {
    Ok(Json(
        room_service::force_advance(&state, &room_id, payload).await?,
    ))
}

/// Host resets the room to a lobby for a rematch.
#[utoipa::path(
    post,
    path = "/rooms/{room_id}/reset",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Four-letter room code")),
    request_body = PlayerRequest,
    responses(
        (status = 200, description = "Fresh lobby", body = RoomEntity),
        (status = 401, description = "Caller is not the host")
    )
)]
pub async fn reset_game(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Valid(Json(payload)): Valid<Json<PlayerRequest>>,
) -> Result<Json<RoomEntity>, AppError> {
    Ok(Json(room_service::reset_game(&state, &room_id, payload).await?))
}

/// Host deletes the room.
#[utoipa::path(
    delete,
    path = "/rooms/{room_id}",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Four-letter room code")),
    request_body = PlayerRequest,
    responses(
        (status = 204, description = "Room deleted"),
        (status = 401, description = "Caller is not the host"),
        (status = 404, description = "Unknown room")
    )
)]
pub async fn delete_room(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Valid(Json(payload)): Valid<Json<PlayerRequest>>,
) -> Result<StatusCode, AppError> {
    room_service::delete_room(&state, &room_id, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}
