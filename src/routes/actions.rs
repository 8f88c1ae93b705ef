use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_valid::Valid;

use crate::{
    dao::models::RoomEntity,
    dto::actions::{AttackRequest, PlayerRequest, RewardRequest, VoteRequest},
    error::AppError,
    services::player_service,
    state::SharedState,
};

/// In-game player actions. Each returns the committed room snapshot.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms/{room_id}/vote", post(cast_vote))
        .route("/rooms/{room_id}/ready", post(declare_ready))
        .route("/rooms/{room_id}/attack", post(choose_attack))
        .route("/rooms/{room_id}/reward", post(choose_reward))
        .route("/rooms/{room_id}/skip", post(skip_attack))
        .route("/rooms/{room_id}/acknowledge", post(acknowledge_result))
}

#[utoipa::path(
    post,
    path = "/rooms/{room_id}/vote",
    tag = "actions",
    params(("room_id" = String, Path, description = "Four-letter room code")),
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Vote recorded", body = RoomEntity),
        (status = 409, description = "Already voted or voting closed")
    )
)]
/// Vote on the live question.
pub async fn cast_vote(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Valid(Json(payload)): Valid<Json<VoteRequest>>,
) -> Result<Json<RoomEntity>, AppError> {
    Ok(Json(
        player_service::cast_vote(&state, &room_id, payload).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/rooms/{room_id}/ready",
    tag = "actions",
    params(("room_id" = String, Path, description = "Four-letter room code")),
    request_body = PlayerRequest,
    responses((status = 200, description = "Player flagged ready", body = RoomEntity))
)]
/// Flag the caller ready for the next round.
pub async fn declare_ready(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Valid(Json(payload)): Valid<Json<PlayerRequest>>,
) -> Result<Json<RoomEntity>, AppError> {
    Ok(Json(
        player_service::declare_ready(&state, &room_id, payload).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/rooms/{room_id}/attack",
    tag = "actions",
    params(("room_id" = String, Path, description = "Four-letter room code")),
    request_body = AttackRequest,
    responses(
        (status = 200, description = "Attack queued", body = RoomEntity),
        (status = 401, description = "Caller did not guess correctly")
    )
)]
/// Queue an attack against another player.
pub async fn choose_attack(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Valid(Json(payload)): Valid<Json<AttackRequest>>,
) -> Result<Json<RoomEntity>, AppError> {
    Ok(Json(
        player_service::choose_attack(&state, &room_id, payload).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/rooms/{room_id}/reward",
    tag = "actions",
    params(("room_id" = String, Path, description = "Four-letter room code")),
    request_body = RewardRequest,
    responses(
        (status = 200, description = "Item granted", body = RoomEntity),
        (status = 401, description = "Caller did not guess correctly")
    )
)]
/// Take an item instead of attacking.
pub async fn choose_reward(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Valid(Json(payload)): Valid<Json<RewardRequest>>,
) -> Result<Json<RoomEntity>, AppError> {
    Ok(Json(
        player_service::choose_reward(&state, &room_id, payload).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/rooms/{room_id}/skip",
    tag = "actions",
    params(("room_id" = String, Path, description = "Four-letter room code")),
    request_body = PlayerRequest,
    responses((status = 200, description = "Decision recorded", body = RoomEntity))
)]
/// Pass on this round's attack.
pub async fn skip_attack(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Valid(Json(payload)): Valid<Json<PlayerRequest>>,
) -> Result<Json<RoomEntity>, AppError> {
    Ok(Json(
        player_service::skip_attack(&state, &room_id, payload).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/rooms/{room_id}/acknowledge",
    tag = "actions",
    params(("room_id" = String, Path, description = "Four-letter room code")),
    request_body = PlayerRequest,
    responses((status = 200, description = "Recap acknowledged", body = RoomEntity))
)]
/// Confirm the round recap has been read.
pub async fn acknowledge_result(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Valid(Json(payload)): Valid<Json<PlayerRequest>>,
) -> Result<Json<RoomEntity>, AppError> {
    Ok(Json(
        player_service::acknowledge_result(&state, &room_id, payload).await?,
    ))
}
