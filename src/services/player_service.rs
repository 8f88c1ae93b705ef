use serde_json::Value;
use tracing::debug;

use crate::{
    dao::{
        models::{Item, PendingAttackEntity, RoomEntity, RoomStatus, VoteEntity},
        patch::{FieldPath, RoomUpdate},
    },
    dto::actions::{AttackRequest, PlayerRequest, RewardRequest, VoteRequest},
    engine::rules::{current_vote, eligible_attackers, is_active},
    error::ServiceError,
    services::room_service::{commit, load_room},
    state::SharedState,
};

fn field(name: &str) -> FieldPath {
    FieldPath::root(name)
}

fn ensure_status(room: &RoomEntity, expected: RoomStatus) -> Result<(), ServiceError> {
    if room.status == expected {
        Ok(())
    } else {
        Err(ServiceError::InvalidState(format!(
            "room is in {}, expected {}",
            room.status.as_str(),
            expected.as_str()
        )))
    }
}

fn ensure_active(room: &RoomEntity, player: &str) -> Result<(), ServiceError> {
    if !room.players.contains_key(player) {
        return Err(ServiceError::NotFound(format!("player {player} not in room")));
    }
    if !is_active(room, player) {
        return Err(ServiceError::InvalidState(format!(
            "{player} has boiled over"
        )));
    }
    Ok(())
}

/// Attack-phase eligibility shared by attack, reward and skip decisions.
fn ensure_may_decide(room: &RoomEntity, player: &str) -> Result<(), ServiceError> {
    ensure_status(room, RoomStatus::Result)?;
    ensure_active(room, player)?;
    if room.round_recap_shown {
        return Err(ServiceError::InvalidState(
            "this round has already been resolved".into(),
        ));
    }
    if !eligible_attackers(room).contains(&player) {
        return Err(ServiceError::Unauthorized(format!(
            "{player} did not guess correctly this round"
        )));
    }
    if room.attack_decisions.get(player).copied().unwrap_or(false) {
        return Err(ServiceError::InvalidState(format!(
            "{player} already decided this round"
        )));
    }
    Ok(())
}

/// Preconditions pinning a decision to the unresolved attack phase of this round.
fn decision_guard(room: &RoomEntity, player: &str) -> RoomUpdate {
    RoomUpdate::new()
        .require(field("status"), "result")
        .require(field("roundId"), room.round_id)
        .require(field("roundRecapShown"), false)
        .require(field("attackDecisions").child(player), Value::Null)
}

/// Record a vote for the live question. The hotseat's vote is the round's truth.
pub async fn cast_vote(
    state: &SharedState,
    room_id: &str,
    request: VoteRequest,
) -> Result<RoomEntity, ServiceError> {
    let store = state.require_room_store().await?;
    let room = load_room(&store, room_id).await?;
    ensure_status(&room, RoomStatus::Game)?;
    ensure_active(&room, &request.player)?;
    if current_vote(&room, &request.player).is_some() {
        return Err(ServiceError::InvalidState(format!(
            "{} already voted this round",
            request.player
        )));
    }
    if let Some(question) = &room.current_question
        && request.choice != question.option_a
        && request.choice != question.option_b
    {
        return Err(ServiceError::InvalidInput(format!(
            "choice must be \"{}\" or \"{}\"",
            question.option_a, question.option_b
        )));
    }

    let vote = VoteEntity {
        choice: request.choice,
        round_id: room.round_id,
    };
    let path = field("votes").child(&request.player);
    let update = RoomUpdate::new()
        .require(field("status"), "game")
        .require(field("roundId"), room.round_id)
        .require(path.clone(), Value::Null)
        .set_json(path, &vote)?;
    debug!(room = %room_id, player = %request.player, round = room.round_id, "vote cast");
    commit(state, &store, room_id, "vote", update).await
}

/// Flag the player ready, in the lobby or after reading the round recap.
pub async fn declare_ready(
    state: &SharedState,
    room_id: &str,
    request: PlayerRequest,
) -> Result<RoomEntity, ServiceError> {
    let store = state.require_room_store().await?;
    let room = load_room(&store, room_id).await?;
    if !matches!(room.status, RoomStatus::Lobby | RoomStatus::Result) {
        return Err(ServiceError::InvalidState(format!(
            "nothing to be ready for while in {}",
            room.status.as_str()
        )));
    }
    ensure_active(&room, &request.player)?;

    let update = RoomUpdate::new()
        .require(field("status"), room.status.as_str())
        .require(field("roundId"), room.round_id)
        .append_unique(field("ready"), request.player.as_str());
    commit(state, &store, room_id, "ready", update).await
}

/// Queue an attack against another active player.
pub async fn choose_attack(
    state: &SharedState,
    room_id: &str,
    request: AttackRequest,
) -> Result<RoomEntity, ServiceError> {
    let store = state.require_room_store().await?;
    let room = load_room(&store, room_id).await?;
    ensure_may_decide(&room, &request.player)?;
    if request.target == request.player {
        return Err(ServiceError::InvalidInput("players cannot attack themselves".into()));
    }
    if !is_active(&room, &request.target) {
        return Err(ServiceError::InvalidInput(format!(
            "{} is not an active player",
            request.target
        )));
    }

    let inventory = room
        .players
        .get(&request.player)
        .map(|player| player.inventory.clone())
        .unwrap_or_default();
    if request.use_oil && !inventory.contains(&Item::Oil) {
        return Err(ServiceError::InvalidInput(format!(
            "{} holds no oil",
            request.player
        )));
    }

    let attack = PendingAttackEntity {
        attacker: request.player.clone(),
        damage: room.config.base_damage,
        has_oil_bonus: request.use_oil,
    };
    let attack = serde_json::to_value(&attack)
        .map_err(|err| ServiceError::Internal(format!("failed to encode attack: {err}")))?;
    let update = decision_guard(&room, &request.player)
        .append_unique(field("pendingAttacks").child(&request.target), attack)
        .set(field("attackDecisions").child(&request.player), true)
        .append_unique(
            field("log"),
            format!(
                "[round {}] {} attacks {}",
                room.round_id, request.player, request.target
            ),
        );
    commit(state, &store, room_id, "attack", update).await
}

/// Take an item instead of attacking.
pub async fn choose_reward(
    state: &SharedState,
    room_id: &str,
    request: RewardRequest,
) -> Result<RoomEntity, ServiceError> {
    let store = state.require_room_store().await?;
    let room = load_room(&store, room_id).await?;
    ensure_may_decide(&room, &request.player)?;

    let current = room
        .players
        .get(&request.player)
        .map(|player| player.inventory.clone())
        .unwrap_or_default();
    let mut inventory = current.clone();
    inventory.push(request.item);

    let inventory_path = FieldPath::root("players")
        .child(&request.player)
        .child("inventory");
    let current = serde_json::to_value(&current)
        .map_err(|err| ServiceError::Internal(format!("failed to encode inventory: {err}")))?;
    let update = decision_guard(&room, &request.player)
        .require(inventory_path.clone(), current)
        .set_json(inventory_path, &inventory)?
        .set(field("attackDecisions").child(&request.player), true)
        .append_unique(
            field("log"),
            format!(
                "[round {}] {} takes a reward",
                room.round_id, request.player
            ),
        );
    commit(state, &store, room_id, "reward", update).await
}

/// Give up this round's attack.
pub async fn skip_attack(
    state: &SharedState,
    room_id: &str,
    request: PlayerRequest,
) -> Result<RoomEntity, ServiceError> {
    let store = state.require_room_store().await?;
    let room = load_room(&store, room_id).await?;
    ensure_may_decide(&room, &request.player)?;

    let update = decision_guard(&room, &request.player)
        .set(field("attackDecisions").child(&request.player), true);
    commit(state, &store, room_id, "skip", update).await
}

/// Confirm the round recap has been seen.
pub async fn acknowledge_result(
    state: &SharedState,
    room_id: &str,
    request: PlayerRequest,
) -> Result<RoomEntity, ServiceError> {
    let store = state.require_room_store().await?;
    let room = load_room(&store, room_id).await?;
    ensure_status(&room, RoomStatus::Result)?;
    if !room.round_recap_shown {
        return Err(ServiceError::InvalidState(
            "the round has not been resolved yet".into(),
        ));
    }
    if !room.players.contains_key(&request.player) {
        return Err(ServiceError::NotFound(format!(
            "player {} not in room",
            request.player
        )));
    }

    let update = RoomUpdate::new()
        .require(field("status"), "result")
        .require(field("roundId"), room.round_id)
        .append_unique(field("popupConfirmed"), request.player.as_str());
    commit(state, &store, room_id, "acknowledge", update).await
}
