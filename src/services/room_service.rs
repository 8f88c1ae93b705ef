use std::sync::Arc;

use rand::Rng;
use serde_json::{Value, json};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::info;

use crate::{
    dao::{
        models::{PlayerEntity, RoomConfigEntity, RoomEntity},
        patch::{FieldPath, RoomUpdate},
        room_store::RoomStore,
        storage::StorageError,
    },
    dto::{
        actions::PlayerRequest,
        rooms::{CreateRoomRequest, JoinRoomRequest, RoomResponse},
    },
    engine::{next_transition, rules::lobby_ready},
    error::ServiceError,
    services::{
        retry::Operation,
        transitions::{self, Authority, TransitionOutcome},
    },
    state::{
        SharedState,
        state_machine::{RoomEvent, compute_transition},
    },
};

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const ROOM_CODE_LEN: usize = 4;
const MAX_CODE_ATTEMPTS: usize = 8;

/// Create a room hosted by the caller and start its host runtime.
pub async fn create_room(
    state: &SharedState,
    request: CreateRoomRequest,
) -> Result<RoomResponse, ServiceError> {
    let store = state.require_room_store().await?;
    let defaults = state.config().room_defaults();
    let config = RoomConfigEntity {
        base_damage: request.base_damage.unwrap_or(defaults.base_damage),
        max_temperature: request.max_temperature.unwrap_or(defaults.max_temperature),
        game_mode: request.game_mode.unwrap_or(defaults.game_mode),
        categories: request
            .categories
            .unwrap_or_else(|| defaults.categories.clone()),
    };

    let mut room = RoomEntity {
        host: request.host.clone(),
        config,
        created_at: now_rfc3339(),
        log: vec![format!("{} opened the room", request.host)],
        ..RoomEntity::default()
    };
    room.players.insert(
        request.host.clone(),
        PlayerEntity {
            emoji: request.emoji,
            ..PlayerEntity::default()
        },
    );

    for _ in 0..MAX_CODE_ATTEMPTS {
        let room_id = generate_room_code();
        let created = state
            .executor()
            .execute(Operation::new(&room_id, "create-room"), || {
                store.create_room(&room_id, room.clone())
            })
            .await;
        match created {
            Ok(()) => {
                info!(room = %room_id, host = %room.host, "room created");
                state.spawn_host(&room_id).await?;
                return Ok(RoomResponse::new(room_id, room));
            }
            Err(StorageError::RoomExists { .. }) => continue,
            Err(err) => return Err(err.into()),
        }
    }

    Err(ServiceError::InvalidState(
        "could not allocate a free room code".into(),
    ))
}

/// Current snapshot of a room.
pub async fn get_room(state: &SharedState, room_id: &str) -> Result<RoomEntity, ServiceError> {
    let store = state.require_room_store().await?;
    load_room(&store, room_id).await
}

/// Add a player to a room that is still in its lobby.
pub async fn join_room(
    state: &SharedState,
    room_id: &str,
    request: JoinRoomRequest,
) -> Result<RoomEntity, ServiceError> {
    let store = state.require_room_store().await?;
    let room = load_room(&store, room_id).await?;
    if compute_transition(room.status, RoomEvent::StartGame).is_err() {
        return Err(ServiceError::InvalidState(
            "the game has already started".into(),
        ));
    }
    if room.players.contains_key(&request.name) {
        return Err(ServiceError::InvalidState(format!(
            "name {} is already taken",
            request.name
        )));
    }

    let player = PlayerEntity {
        emoji: request.emoji,
        ..PlayerEntity::default()
    };
    let path = FieldPath::root("players").child(&request.name);
    let update = RoomUpdate::new()
        .require(FieldPath::root("status"), "lobby")
        .require(path.clone(), Value::Null)
        .set_json(path, &player)?
        .append_unique(
            FieldPath::root("log"),
            format!("{} joined", request.name),
        );
    commit(state, &store, room_id, "join", update).await
}

/// Host starts the first round once everybody in the lobby is ready.
pub async fn start_game(
    state: &SharedState,
    room_id: &str,
    request: PlayerRequest,
) -> Result<RoomEntity, ServiceError> {
    let store = state.require_room_store().await?;
    let room = load_room(&store, room_id).await?;
    ensure_host(&room, &request.player)?;
    compute_transition(room.status, RoomEvent::StartGame)?;
    if !lobby_ready(&room) {
        return Err(ServiceError::InvalidState(
            "at least two players must be ready".into(),
        ));
    }

    let Some(update) = transitions::start_game(&room, state.questions().as_ref())? else {
        return Err(ServiceError::InvalidState("no active players".into()));
    };
    commit(state, &store, room_id, "start-game", update).await
}

/// Host override: run whatever transition comes next, skipping completeness gates.
pub async fn force_advance(
    state: &SharedState,
    room_id: &str,
    request: PlayerRequest,
) -> Result<RoomEntity, ServiceError> {
    let ctx = state.transition_context().await?;
    let room = load_room(&ctx.store, room_id).await?;
    ensure_host(&room, &request.player)?;
    let Some(next) = next_transition(&room) else {
        return Err(ServiceError::InvalidState(format!(
            "nothing to advance while in {}",
            room.status.as_str()
        )));
    };

    info!(room = %room_id, transition = next.name(), "host forcing transition");
    match transitions::execute(&ctx, Authority::Override, room_id, next, true).await? {
        TransitionOutcome::Applied(room) => Ok(*room),
        TransitionOutcome::Settled | TransitionOutcome::NotDue => {
            load_room(&ctx.store, room_id).await
        }
    }
}

/// Host resets the room to a fresh lobby keeping the same players.
pub async fn reset_game(
    state: &SharedState,
    room_id: &str,
    request: PlayerRequest,
) -> Result<RoomEntity, ServiceError> {
    let store = state.require_room_store().await?;
    let room = load_room(&store, room_id).await?;
    ensure_host(&room, &request.player)?;
    compute_transition(room.status, RoomEvent::Rematch)?;

    let players: indexmap::IndexMap<&str, PlayerEntity> = room
        .players
        .iter()
        .map(|(name, player)| {
            (
                name.as_str(),
                PlayerEntity {
                    emoji: player.emoji.clone(),
                    ..PlayerEntity::default()
                },
            )
        })
        .collect();

    let update = RoomUpdate::new()
        .require(FieldPath::root("roundId"), room.round_id)
        .set(FieldPath::root("status"), "lobby")
        .set_json(FieldPath::root("players"), &players)?
        .set(FieldPath::root("hotseat"), Value::Null)
        .set(FieldPath::root("currentQuestion"), Value::Null)
        .set(FieldPath::root("votes"), json!({}))
        .set(FieldPath::root("attackDecisions"), json!({}))
        .set(FieldPath::root("pendingAttacks"), json!({}))
        .set(FieldPath::root("attackResults"), json!({}))
        .set(FieldPath::root("roundRecapShown"), false)
        .set(FieldPath::root("ready"), json!([]))
        .set(FieldPath::root("popupConfirmed"), json!([]))
        .set(FieldPath::root("eliminatedPlayers"), json!([]))
        .set(FieldPath::root("winner"), Value::Null)
        .append_unique(
            FieldPath::root("log"),
            format!("[round {}] rematch", room.round_id),
        );
    commit(state, &store, room_id, "reset", update).await
}

/// Host deletes the room; every observer sees it close.
pub async fn delete_room(
    state: &SharedState,
    room_id: &str,
    request: PlayerRequest,
) -> Result<(), ServiceError> {
    let store = state.require_room_store().await?;
    let room = load_room(&store, room_id).await?;
    ensure_host(&room, &request.player)?;

    let deleted = state
        .executor()
        .execute(Operation::new(room_id, "delete-room"), || {
            store.delete_room(room_id)
        })
        .await?;
    state.stop_host(room_id);
    if !deleted {
        return Err(ServiceError::NotFound(format!("room {room_id} not found")));
    }
    info!(room = %room_id, "room deleted");
    Ok(())
}

/// Read a room, treating absence as not found.
pub(crate) async fn load_room(
    store: &Arc<dyn RoomStore>,
    room_id: &str,
) -> Result<RoomEntity, ServiceError> {
    store
        .fetch_room(room_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room {room_id} not found")))
}

/// Submit a batch through the retry executor. A failed precondition means the room moved
/// on between our read and our write.
pub(crate) async fn commit(
    state: &SharedState,
    store: &Arc<dyn RoomStore>,
    room_id: &str,
    label: &str,
    update: RoomUpdate,
) -> Result<RoomEntity, ServiceError> {
    let committed = state
        .executor()
        .execute(Operation::new(room_id, label), || {
            store.update_room(room_id, update.clone())
        })
        .await;
    match committed {
        Ok(room) => Ok(room),
        Err(StorageError::PreconditionFailed { path, .. }) => Err(ServiceError::InvalidState(
            format!("room changed meanwhile ({path}); refresh and retry"),
        )),
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn ensure_host(room: &RoomEntity, player: &str) -> Result<(), ServiceError> {
    if room.host == player {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(format!(
            "only the host ({}) may do this",
            room.host
        )))
    }
}

fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AppConfig, RoleConfig},
        dao::{models::RoomStatus, room_store::memory::MemoryRoomStore},
        state::AppState,
    };

    async fn state() -> SharedState {
        let config = AppConfig::default().with_roles(RoleConfig {
            host_controllers: false,
            server_trigger: false,
        });
        let state = AppState::new(config);
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        state
    }

    fn create(host: &str) -> CreateRoomRequest {
        CreateRoomRequest {
            host: host.into(),
            emoji: "🔥".into(),
            game_mode: None,
            base_damage: None,
            max_temperature: None,
            categories: None,
        }
    }

    fn as_player(name: &str) -> PlayerRequest {
        PlayerRequest {
            player: name.into(),
        }
    }

    #[test]
    fn room_codes_use_the_unambiguous_alphabet() {
        let code = generate_room_code();
        assert_eq!(code.len(), ROOM_CODE_LEN);
        assert!(code.bytes().all(|byte| ROOM_CODE_ALPHABET.contains(&byte)));
    }

    #[tokio::test]
    async fn lobby_flow_until_start() {
        let state = state().await;
        let created = create_room(&state, create("alice")).await.unwrap();
        let room_id = created.room_id;
        assert_eq!(created.room.players.len(), 1);

        let joined = join_room(
            &state,
            &room_id,
            JoinRoomRequest {
                name: "bob".into(),
                emoji: String::new(),
            },
        )
        .await
        .unwrap();
        assert_eq!(joined.players.len(), 2);

        let duplicate = join_room(
            &state,
            &room_id,
            JoinRoomRequest {
                name: "bob".into(),
                emoji: String::new(),
            },
        )
        .await;
        assert!(matches!(duplicate, Err(ServiceError::InvalidState(_))));

        let not_ready = start_game(&state, &room_id, as_player("alice")).await;
        assert!(matches!(not_ready, Err(ServiceError::InvalidState(_))));

        let store = state.require_room_store().await.unwrap();
        for name in ["alice", "bob"] {
            store
                .update_room(
                    &room_id,
                    RoomUpdate::new().append_unique(FieldPath::root("ready"), name),
                )
                .await
                .unwrap();
        }

        let intruder = start_game(&state, &room_id, as_player("bob")).await;
        assert!(matches!(intruder, Err(ServiceError::Unauthorized(_))));

        let room = start_game(&state, &room_id, as_player("alice")).await.unwrap();
        assert_eq!(room.status, RoomStatus::Game);
        assert_eq!(room.round_id, 1);
        assert_eq!(room.hotseat.as_deref(), Some("alice"));
        assert!(room.ready.is_empty());
        assert!(room.current_question.is_some());
    }

    #[tokio::test]
    async fn reset_returns_to_a_cool_lobby() {
        let state = state().await;
        let room_id = create_room(&state, create("alice")).await.unwrap().room_id;
        let store = state.require_room_store().await.unwrap();
        store
            .update_room(
                &room_id,
                RoomUpdate::new()
                    .set(FieldPath::root("status"), "winner")
                    .set(FieldPath::root("roundId"), 3)
                    .set(FieldPath::parse("players.alice.temperature"), 70)
                    .set(FieldPath::root("winner"), "alice"),
            )
            .await
            .unwrap();

        let room = reset_game(&state, &room_id, as_player("alice")).await.unwrap();
        assert_eq!(room.status, RoomStatus::Lobby);
        assert_eq!(room.round_id, 3);
        assert_eq!(room.players["alice"].temperature, 0);
        assert_eq!(room.players["alice"].emoji, "🔥");
        assert!(room.winner.is_none());
    }

    #[tokio::test]
    async fn only_the_host_deletes() {
        let state = state().await;
        let room_id = create_room(&state, create("alice")).await.unwrap().room_id;

        let denied = delete_room(&state, &room_id, as_player("mallory")).await;
        assert!(matches!(denied, Err(ServiceError::Unauthorized(_))));

        delete_room(&state, &room_id, as_player("alice")).await.unwrap();
        assert!(matches!(
            get_room(&state, &room_id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
