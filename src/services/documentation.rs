use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the Hotseat Heat backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::room_stream,
        crate::routes::rooms::create_room,
        crate::routes::rooms::get_room,
        crate::routes::rooms::join_room,
        crate::routes::rooms::start_game,
        crate::routes::rooms::force_advance,
        crate::routes::rooms::reset_game,
        crate::routes::rooms::delete_room,
        crate::routes::actions::cast_vote,
        crate::routes::actions::declare_ready,
        crate::routes::actions::choose_attack,
        crate::routes::actions::choose_reward,
        crate::routes::actions::skip_attack,
        crate::routes::actions::acknowledge_result,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::rooms::CreateRoomRequest,
            crate::dto::rooms::JoinRoomRequest,
            crate::dto::rooms::RoomResponse,
            crate::dto::actions::PlayerRequest,
            crate::dto::actions::VoteRequest,
            crate::dto::actions::AttackRequest,
            crate::dto::actions::RewardRequest,
            crate::dto::sse::RoomClosedEvent,
            crate::dao::models::RoomEntity,
            crate::dao::models::RoomStatus,
            crate::dao::models::Item,
            crate::dao::models::GameMode,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room lifecycle and host controls"),
        (name = "actions", description = "Player actions during a round"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_room_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/rooms",
            "/rooms/{room_id}",
            "/rooms/{room_id}/events",
            "/rooms/{room_id}/force-advance",
            "/rooms/{room_id}/acknowledge",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
