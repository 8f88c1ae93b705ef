use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "ok" when the room store answers, "degraded" otherwise.
    pub status: String,
    /// Rooms whose round controller and watchdog run in this process.
    pub hosted_rooms: usize,
}

impl HealthResponse {
    /// Store reachable.
    pub fn ok(hosted_rooms: usize) -> Self {
        Self {
            status: "ok".to_string(),
            hosted_rooms,
        }
    }

    /// Running without a usable store.
    pub fn degraded(hosted_rooms: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            hosted_rooms,
        }
    }
}
