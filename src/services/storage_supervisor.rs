use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{room_store::RoomStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the room store, install it, and flip the shared degraded flag whenever the
/// backend stops answering.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn RoomStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_room_store(store.clone()).await;
                info!("room store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                if !supervise(&state, store.as_ref()).await {
                    warn!("exhausted room store reconnect attempts; staying in degraded mode");
                    state.clear_room_store().await;
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "room store connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Poll the store's health until reconnecting fails for good. Returns `false` then.
async fn supervise(state: &SharedState, store: &dyn RoomStore) -> bool {
    loop {
        if store.health_check().await.is_ok() {
            if state.is_degraded() {
                info!("room store healthy again; leaving degraded mode");
                state.update_degraded(false);
            }
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        let mut reconnect_delay = INITIAL_DELAY;
        let mut reconnected = false;
        for attempt in 0..MAX_RECONNECT_ATTEMPTS {
            match store.try_reconnect().await {
                Ok(()) => {
                    info!(attempt, "room store reconnected after failed health check");
                    reconnected = true;
                    break;
                }
                Err(err) => {
                    if attempt == 0 {
                        warn!(
                            attempt,
                            error = %err,
                            "room store reconnect failed; entering degraded mode"
                        );
                        state.update_degraded(true);
                    } else {
                        warn!(attempt, error = %err, "room store reconnect attempt failed");
                    }
                    sleep(reconnect_delay).await;
                    reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
                }
            }
        }

        if !reconnected {
            return false;
        }
        state.update_degraded(false);
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AppConfig, RoleConfig},
        dao::room_store::memory::MemoryRoomStore,
        state::AppState,
    };

    #[tokio::test(start_paused = true)]
    async fn degraded_flag_follows_store_health() {
        let state = AppState::new(AppConfig::default().with_roles(RoleConfig {
            host_controllers: false,
            server_trigger: false,
        }));
        assert!(state.is_degraded());

        let store = MemoryRoomStore::new();
        let handle = {
            let store = store.clone();
            tokio::spawn(run(state.clone(), move || {
                let store = store.clone();
                async move { Ok(Arc::new(store) as Arc<dyn RoomStore>) }
            }))
        };

        sleep(Duration::from_millis(10)).await;
        assert!(!state.is_degraded());

        store.set_offline(true);
        sleep(HEALTH_POLL_INTERVAL * 2).await;
        assert!(state.is_degraded());

        store.set_offline(false);
        sleep(HEALTH_POLL_INTERVAL * 2).await;
        assert!(!state.is_degraded());

        handle.abort();
    }
}
