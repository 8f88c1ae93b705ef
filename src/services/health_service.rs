use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether the room store is usable, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_room_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "room store health check failed");
            }
        }
        Err(_) => warn!("room store unavailable (degraded mode)"),
    }

    let hosted_rooms = state.hosted_room_count();
    if state.is_degraded() {
        HealthResponse::degraded(hosted_rooms)
    } else {
        HealthResponse::ok(hosted_rooms)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::room_store::memory::MemoryRoomStore, state::AppState};

    #[tokio::test]
    async fn degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(health_status(&state).await.status, "degraded");

        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        let health = health_status(&state).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.hosted_rooms, 0);
    }
}
