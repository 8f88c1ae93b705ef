//! End-to-end rounds over the in-memory store with every authority running.

use std::{sync::Arc, time::Duration};

use hotseat_heat_back::{
    config::{AppConfig, RoleConfig, TimingConfig},
    dao::{
        models::{RoomEntity, RoomStatus},
        room_store::{RoomStore, memory::MemoryRoomStore},
    },
    dto::{
        actions::{AttackRequest, PlayerRequest, VoteRequest},
        rooms::{CreateRoomRequest, JoinRoomRequest},
    },
    services::{player_service, room_service},
    state::{AppState, SharedState},
};
use tokio::time::sleep;

const DEBOUNCE: Duration = Duration::from_millis(100);

async fn boot(roles: RoleConfig) -> (SharedState, MemoryRoomStore) {
    let timing = TimingConfig {
        debounce: DEBOUNCE,
        ..TimingConfig::default()
    };
    let state = AppState::new(AppConfig::default().with_timing(timing).with_roles(roles));
    let store = MemoryRoomStore::new();
    state.install_room_store(Arc::new(store.clone())).await;
    (state, store)
}

fn player(name: &str) -> PlayerRequest {
    PlayerRequest {
        player: name.into(),
    }
}

/// Create a room hosted by `a`, seat `b` and `c`, and start round one.
async fn started_room(state: &SharedState) -> String {
    let room_id = room_service::create_room(
        state,
        CreateRoomRequest {
            host: "a".into(),
            emoji: "🌶️".into(),
            game_mode: None,
            base_damage: None,
            max_temperature: None,
            categories: None,
        },
    )
    .await
    .unwrap()
    .room_id;

    for name in ["b", "c"] {
        room_service::join_room(
            state,
            &room_id,
            JoinRoomRequest {
                name: name.into(),
                emoji: String::new(),
            },
        )
        .await
        .unwrap();
    }
    for name in ["a", "b", "c"] {
        player_service::declare_ready(state, &room_id, player(name))
            .await
            .unwrap();
    }
    let room = room_service::start_game(state, &room_id, player("a"))
        .await
        .unwrap();
    assert_eq!(room.status, RoomStatus::Game);
    room_id
}

async fn vote(state: &SharedState, room_id: &str, name: &str, choice: &str) {
    player_service::cast_vote(
        state,
        room_id,
        VoteRequest {
            player: name.into(),
            choice: choice.into(),
        },
    )
    .await
    .unwrap();
}

async fn snapshot(store: &MemoryRoomStore, room_id: &str) -> RoomEntity {
    store.fetch_room(room_id).await.unwrap().unwrap()
}

/// Hotseat and `b` agree, `c` guesses wrong.
async fn play_votes(state: &SharedState, store: &MemoryRoomStore, room_id: &str) {
    let room = snapshot(store, room_id).await;
    let question = room.current_question.unwrap();
    vote(state, room_id, "a", &question.option_a).await;
    vote(state, room_id, "b", &question.option_a).await;
    vote(state, room_id, "c", &question.option_b).await;
}

#[tokio::test(start_paused = true)]
async fn full_round_with_every_authority_running() {
    let (state, store) = boot(RoleConfig::default()).await;
    let room_id = started_room(&state).await;
    assert!(state.hosts_room(&room_id));

    play_votes(&state, &store, &room_id).await;
    sleep(DEBOUNCE * 3).await;

    let room = snapshot(&store, &room_id).await;
    assert_eq!(room.status, RoomStatus::Result);
    // Party mode heats the wrong guesser as soon as voting closes.
    assert_eq!(room.players["c"].temperature, 10);
    assert!(!room.round_recap_shown);

    player_service::choose_attack(
        &state,
        &room_id,
        AttackRequest {
            player: "b".into(),
            target: "c".into(),
            use_oil: false,
        },
    )
    .await
    .unwrap();
    sleep(DEBOUNCE * 3).await;

    let room = snapshot(&store, &room_id).await;
    assert!(room.round_recap_shown);
    assert_eq!(room.players["c"].temperature, 30);
    assert_eq!(room.players["b"].temperature, 0);
    let recap = &room.attack_results["c"];
    assert_eq!(recap.attackers, vec!["b".to_owned()]);
    assert_eq!(recap.total_damage, 30);
    assert_eq!(recap.attack_details.len(), 2);
    assert!(recap.attack_details[0].is_penalty);
    assert_eq!(recap.attack_details[0].attacker, "Strafhitze");
    assert_eq!(recap.attack_details[0].damage, 10);
    assert_eq!(recap.attack_details[1].attacker, "b");
    assert_eq!(recap.attack_details[1].damage, 20);

    for name in ["a", "b", "c"] {
        player_service::acknowledge_result(&state, &room_id, player(name))
            .await
            .unwrap();
        player_service::declare_ready(&state, &room_id, player(name))
            .await
            .unwrap();
    }
    sleep(DEBOUNCE * 3).await;

    let room = snapshot(&store, &room_id).await;
    assert_eq!(room.status, RoomStatus::Game);
    assert_eq!(room.round_id, 2);
    assert_eq!(room.hotseat.as_deref(), Some("b"));
    assert!(room.votes.is_empty());
    assert!(room.attack_results.is_empty());
    // Temperatures carry over between rounds.
    assert_eq!(room.players["c"].temperature, 30);
    assert_eq!(
        room.log
            .iter()
            .filter(|line| *line == "[round 1] c guessed wrong")
            .count(),
        1
    );
    assert!(room.log.iter().any(|line| line == "[round 1] c took 30 heat"));
}

#[tokio::test(start_paused = true)]
async fn server_trigger_alone_closes_voting() {
    let (state, store) = boot(RoleConfig {
        host_controllers: false,
        server_trigger: true,
    })
    .await;
    let room_id = started_room(&state).await;
    assert!(!state.hosts_room(&room_id));

    play_votes(&state, &store, &room_id).await;
    sleep(DEBOUNCE * 3).await;

    let room = snapshot(&store, &room_id).await;
    assert_eq!(room.status, RoomStatus::Result);
    assert_eq!(room.players["c"].temperature, 10);
}

#[tokio::test(start_paused = true)]
async fn host_can_force_voting_closed() {
    let (state, store) = boot(RoleConfig {
        host_controllers: false,
        server_trigger: false,
    })
    .await;
    let room_id = started_room(&state).await;

    let question = snapshot(&store, &room_id).await.current_question.unwrap();
    vote(&state, &room_id, "a", &question.option_a).await;
    vote(&state, &room_id, "b", &question.option_b).await;

    let denied = room_service::force_advance(&state, &room_id, player("b")).await;
    assert!(denied.is_err());

    let room = room_service::force_advance(&state, &room_id, player("a"))
        .await
        .unwrap();
    assert_eq!(room.status, RoomStatus::Result);
    assert_eq!(room.players["b"].temperature, 10);
    // No vote means no penalty.
    assert_eq!(room.players["c"].temperature, 0);
}
