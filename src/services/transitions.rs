//! Guarded room transitions shared by the round controller, the server trigger and the
//! watchdog.
//!
//! Every transition re-reads the room, re-checks what is due and submits one atomic batch
//! whose preconditions pin the status, the round and (for resolution) the recap flag. The
//! flag is written in the same batch as the temperature changes, so whichever authority
//! lands second fails its preconditions and reports [`TransitionOutcome::Settled`].

use std::{fmt, sync::Arc};

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::{RoomEntity, RoomStatus},
        patch::{FieldPath, RoomUpdate},
        room_store::RoomStore,
        storage::{StorageError, StorageResult},
    },
    engine::{
        DueTransition, PenaltyPolicy, due_transition, next_transition, resolve_attacks,
        rules::{PENALTY_DAMAGE, active_players, is_active, next_hotseat, truth, wrong_guessers},
    },
    services::{
        questions::QuestionSource,
        retry::{Operation, RetryExecutor},
    },
};

/// Which process is driving a transition. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Round controller of the hosting process.
    Host,
    /// Global mutation follower.
    ServerTrigger,
    /// Recovery watchdog forcing an overdue transition.
    Watchdog,
    /// Explicit host request.
    Override,
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Authority::Host => "host",
            Authority::ServerTrigger => "server-trigger",
            Authority::Watchdog => "watchdog",
            Authority::Override => "override",
        })
    }
}

/// Collaborators a transition needs.
#[derive(Clone)]
pub struct TransitionContext {
    /// Where room records live.
    pub store: Arc<dyn RoomStore>,
    /// Retry bounds and the in-flight registry.
    pub executor: RetryExecutor,
    /// Draws the question for each new round.
    pub questions: Arc<dyn QuestionSource>,
}

/// Result of attempting a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// This call's batch landed; carries the committed record.
    Applied(Box<RoomEntity>),
    /// Someone else already performed it, or the room moved on.
    Settled,
    /// The fresh snapshot does not owe this transition (yet).
    NotDue,
}

fn field(name: &str) -> FieldPath {
    FieldPath::root(name)
}

fn player_field(player: &str, name: &str) -> FieldPath {
    FieldPath::root("players").child(player).child(name)
}

/// Read the room through the retry executor. A missing room is an error for transitions.
pub async fn fetch_fresh(ctx: &TransitionContext, room_id: &str) -> StorageResult<RoomEntity> {
    let room = ctx
        .executor
        .execute(Operation::new(room_id, "fetch"), || ctx.store.fetch_room(room_id))
        .await?;
    room.ok_or_else(|| StorageError::RoomNotFound {
        room_id: room_id.to_owned(),
    })
}

/// Perform `expected` on the room if it is still owed. With `force`, completeness gates are
/// skipped but the idempotency preconditions still apply.
pub async fn execute(
    ctx: &TransitionContext,
    authority: Authority,
    room_id: &str,
    expected: DueTransition,
    force: bool,
) -> StorageResult<TransitionOutcome> {
    let room = fetch_fresh(ctx, room_id).await?;

    if already_done(&room, expected) {
        debug!(room = %room_id, transition = expected.name(), %authority, "transition already settled");
        return Ok(TransitionOutcome::Settled);
    }
    let owed = if force {
        next_transition(&room)
    } else {
        due_transition(&room)
    };
    if owed != Some(expected) {
        return Ok(TransitionOutcome::NotDue);
    }
    if !force && let Some(problem) = divergence(&room, expected) {
        warn!(
            room = %room_id,
            round = expected.round_id(),
            transition = expected.name(),
            %authority,
            problem,
            "guard state diverged; withholding transition"
        );
        return Ok(TransitionOutcome::NotDue);
    }

    let update = match expected {
        DueTransition::FinishVoting { .. } => finish_voting(&room),
        DueTransition::ResolveAttacks { .. } => resolve_round(&room)?,
        DueTransition::AdvanceRound { .. } => advance_round(&room, ctx.questions.as_ref())?,
        DueTransition::DeclareWinner { .. } => declare_winner(&room),
    };

    let label = format!("{}:{}", expected.name(), expected.round_id());
    let committed = ctx
        .executor
        .execute(Operation::new(room_id, label), || {
            ctx.store.update_room(room_id, update.clone())
        })
        .await;

    match committed {
        Ok(room) => {
            info!(
                room = %room_id,
                round = expected.round_id(),
                transition = expected.name(),
                %authority,
                status = room.status.as_str(),
                "transition applied"
            );
            Ok(TransitionOutcome::Applied(Box::new(room)))
        }
        Err(StorageError::PreconditionFailed { path, .. }) => {
            debug!(
                room = %room_id,
                transition = expected.name(),
                %authority,
                %path,
                "transition lost the race; already applied elsewhere"
            );
            Ok(TransitionOutcome::Settled)
        }
        Err(err) => Err(err),
    }
}

/// Whether the record already reflects `expected` (or a later state).
fn already_done(room: &RoomEntity, expected: DueTransition) -> bool {
    if room.round_id != expected.round_id() {
        return true;
    }
    match expected {
        DueTransition::FinishVoting { .. } => room.status != RoomStatus::Game,
        DueTransition::ResolveAttacks { .. } => {
            room.status != RoomStatus::Result || room.round_recap_shown
        }
        DueTransition::AdvanceRound { .. } => room.status != RoomStatus::Result,
        DueTransition::DeclareWinner { .. } => {
            matches!(room.status, RoomStatus::Winner | RoomStatus::Lobby)
        }
    }
}

/// Inconsistencies that make an otherwise open gate untrustworthy.
fn divergence(room: &RoomEntity, expected: DueTransition) -> Option<&'static str> {
    match expected {
        DueTransition::ResolveAttacks { .. } | DueTransition::AdvanceRound { .. }
            if truth(room).is_none() =>
        {
            Some("hotseat vote missing")
        }
        DueTransition::FinishVoting { .. }
            if room
                .hotseat
                .as_deref()
                .is_none_or(|hotseat| !is_active(room, hotseat)) =>
        {
            Some("no active hotseat")
        }
        _ => None,
    }
}

fn round_guard(room: &RoomEntity) -> RoomUpdate {
    RoomUpdate::new()
        .require(field("status"), room.status.as_str())
        .require(field("roundId"), room.round_id)
}

fn log_line(round_id: u64, text: impl fmt::Display) -> Value {
    Value::String(format!("[round {round_id}] {text}"))
}

/// Status fields for a room whose active players dropped to `remaining`.
fn finish_game(update: RoomUpdate, round_id: u64, remaining: &[&str]) -> RoomUpdate {
    let winner = remaining.first().copied();
    let text = match winner {
        Some(name) => format!("{name} wins"),
        None => "nobody survived".to_owned(),
    };
    update
        .set(field("status"), "winner")
        .set(field("winner"), winner.map_or(Value::Null, Value::from))
        .append_unique(field("log"), log_line(round_id, text))
}

/// game -> result. Disqualifies wrong guessers and, under the eager policy, heats them up.
fn finish_voting(room: &RoomEntity) -> RoomUpdate {
    let round_id = room.round_id;
    let policy = PenaltyPolicy::from(room.config.game_mode);
    let mut update = round_guard(room);

    if let (Some(hotseat), Some(choice)) = (room.hotseat.as_deref(), truth(room)) {
        update = update.append_unique(
            field("log"),
            log_line(round_id, format!("{hotseat} picked {choice}")),
        );
    }

    let mut eliminated = Vec::new();
    for name in wrong_guessers(room) {
        if !is_active(room, name) {
            continue;
        }
        update = update
            .set(FieldPath::root("attackDecisions").child(name), true)
            .append_unique(
                field("log"),
                log_line(round_id, format!("{name} guessed wrong")),
            );
        if policy == PenaltyPolicy::Eager {
            update = update.increment(
                player_field(name, "temperature"),
                i64::from(PENALTY_DAMAGE),
            );
            if room.players[name].temperature + PENALTY_DAMAGE >= room.config.max_temperature {
                update = update.append_unique(field("eliminatedPlayers"), name);
                eliminated.push(name);
            }
        }
    }

    let remaining: Vec<&str> = active_players(room)
        .into_iter()
        .filter(|name| !eliminated.contains(name))
        .collect();
    if remaining.len() <= 1 {
        finish_game(update, round_id, &remaining)
    } else {
        update.set(field("status"), "result")
    }
}

/// Resolution: applies the round's deltas and sets the recap flag in one batch.
fn resolve_round(room: &RoomEntity) -> StorageResult<RoomUpdate> {
    let round_id = room.round_id;
    let resolution = resolve_attacks(room);
    let mut update = round_guard(room).require(field("roundRecapShown"), false);

    for (name, delta) in &resolution.deltas {
        update = update.increment(player_field(name, "temperature"), *delta);
    }
    for (name, items) in &resolution.inventories {
        update = update.set_json(player_field(name, "inventory"), items)?;
    }
    for name in &resolution.eliminated {
        update = update
            .append_unique(field("eliminatedPlayers"), name.as_str())
            .append_unique(field("log"), log_line(round_id, format!("{name} boiled over")));
    }
    for (name, result) in &resolution.results {
        if result.total_damage > 0 {
            update = update.append_unique(
                field("log"),
                log_line(round_id, format!("{name} took {} heat", result.total_damage)),
            );
        }
    }
    update = update
        .set_json(field("attackResults"), &resolution.results)?
        .set(field("roundRecapShown"), true);

    let remaining: Vec<&str> = active_players(room)
        .into_iter()
        .filter(|name| !resolution.eliminated.iter().any(|out| out == *name))
        .collect();
    if remaining.len() <= 1 {
        update = finish_game(update, round_id, &remaining);
    }
    Ok(update)
}

/// result -> game, or result -> winner when nobody is left to play against.
fn advance_round(room: &RoomEntity, questions: &dyn QuestionSource) -> StorageResult<RoomUpdate> {
    let update = round_guard(room).require(field("roundRecapShown"), true);
    let active = active_players(room);
    if active.len() <= 1 {
        return Ok(finish_game(update, room.round_id, &active));
    }
    match next_hotseat(room) {
        Some(hotseat) => begin_round(update, room, &hotseat, questions),
        None => Ok(finish_game(update, room.round_id, &active)),
    }
}

/// any -> winner once at most one player is active.
fn declare_winner(room: &RoomEntity) -> RoomUpdate {
    let active = active_players(room);
    finish_game(round_guard(room), room.round_id, &active)
}

/// lobby -> game. Returns `None` when the lobby cannot start a round.
pub fn start_game(room: &RoomEntity, questions: &dyn QuestionSource) -> StorageResult<Option<RoomUpdate>> {
    let Some(hotseat) = active_players(room).first().map(|name| (*name).to_owned()) else {
        return Ok(None);
    };
    begin_round(round_guard(room), room, &hotseat, questions).map(Some)
}

/// Open the next round: bump the round id, seat the hotseat, draw a question and clear
/// every round-scoped field.
fn begin_round(
    update: RoomUpdate,
    room: &RoomEntity,
    hotseat: &str,
    questions: &dyn QuestionSource,
) -> StorageResult<RoomUpdate> {
    let round_id = room.round_id + 1;
    let mut update = update
        .set(field("status"), "game")
        .set(field("roundId"), round_id)
        .set(field("hotseat"), hotseat)
        .set(field("votes"), json!({}))
        .set(field("attackDecisions"), json!({}))
        .set(field("pendingAttacks"), json!({}))
        .set(field("attackResults"), json!({}))
        .set(field("ready"), json!([]))
        .set(field("popupConfirmed"), json!([]))
        .set(field("roundRecapShown"), false);

    match questions.get_question(&room.used_questions, &room.config.categories) {
        Some((index, question)) => {
            update = update.set_json(field("currentQuestion"), &question)?;
            // A repeat means the catalogue ran dry; the draw history starts over from it.
            update = if room.used_questions.contains(&index) {
                update.set(field("usedQuestions"), json!([index]))
            } else {
                update.append_unique(field("usedQuestions"), index)
            };
            update = update.append_unique(
                field("log"),
                log_line(round_id, format!("{hotseat} is on the hotseat: {}", question.prompt)),
            );
        }
        None => {
            update = update.set(field("currentQuestion"), Value::Null).append_unique(
                field("log"),
                log_line(round_id, format!("{hotseat} is on the hotseat")),
            );
        }
    }
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{
            models::{
                GameMode, Item, PendingAttackEntity, PlayerEntity, QuestionEntity, VoteEntity,
            },
            room_store::memory::MemoryRoomStore,
        },
        services::{questions::Catalogue, retry::RetryPolicy},
    };

    fn context(store: &MemoryRoomStore) -> TransitionContext {
        let question = |prompt: &str| QuestionEntity {
            prompt: prompt.into(),
            option_a: "X".into(),
            option_b: "Y".into(),
            category: "test".into(),
        };
        TransitionContext {
            store: Arc::new(store.clone()),
            executor: RetryExecutor::new(RetryPolicy::default()),
            questions: Arc::new(Catalogue::new(vec![question("q0"), question("q1")])),
        }
    }

    fn game_room(mode: GameMode) -> RoomEntity {
        let mut room = RoomEntity {
            host: "a".into(),
            status: RoomStatus::Game,
            round_id: 1,
            hotseat: Some("a".into()),
            used_questions: vec![0],
            ..RoomEntity::default()
        };
        room.config.game_mode = mode;
        for name in ["a", "b", "c"] {
            room.players.insert(name.into(), PlayerEntity::default());
        }
        room
    }

    async fn seeded(room: RoomEntity) -> (MemoryRoomStore, TransitionContext) {
        let store = MemoryRoomStore::new();
        store.create_room("ROOM", room).await.unwrap();
        let ctx = context(&store);
        (store, ctx)
    }

    async fn vote(ctx: &TransitionContext, name: &str, choice: &str) {
        ctx.store
            .update_room(
                "ROOM",
                RoomUpdate::new().set(
                    FieldPath::root("votes").child(name),
                    json!({ "choice": choice, "roundId": 1 }),
                ),
            )
            .await
            .unwrap();
    }

    async fn vote_all(ctx: &TransitionContext) {
        vote(ctx, "a", "X").await;
        vote(ctx, "b", "X").await;
        vote(ctx, "c", "Y").await;
    }

    const FINISH: DueTransition = DueTransition::FinishVoting { round_id: 1 };
    const RESOLVE: DueTransition = DueTransition::ResolveAttacks { round_id: 1 };

    #[tokio::test]
    async fn finish_voting_applies_eager_penalty_once() {
        let (_store, ctx) = seeded(game_room(GameMode::Party)).await;
        vote_all(&ctx).await;

        let first = execute(&ctx, Authority::Host, "ROOM", FINISH, false).await.unwrap();
        let TransitionOutcome::Applied(room) = first else {
            panic!("expected applied, got {first:?}");
        };
        assert_eq!(room.status, RoomStatus::Result);
        assert_eq!(room.players["c"].temperature, 10);
        assert_eq!(room.attack_decisions.get("c"), Some(&true));

        let second = execute(&ctx, Authority::ServerTrigger, "ROOM", FINISH, false)
            .await
            .unwrap();
        assert_eq!(second, TransitionOutcome::Settled);
        let room = fetch_fresh(&ctx, "ROOM").await.unwrap();
        assert_eq!(room.players["c"].temperature, 10);
    }

    #[tokio::test]
    async fn deferred_penalty_waits_for_resolution() {
        let (_store, ctx) = seeded(game_room(GameMode::Classic)).await;
        vote_all(&ctx).await;
        execute(&ctx, Authority::Host, "ROOM", FINISH, false).await.unwrap();
        let room = fetch_fresh(&ctx, "ROOM").await.unwrap();
        assert_eq!(room.players["c"].temperature, 0);

        ctx.store
            .update_room(
                "ROOM",
                RoomUpdate::new().set(FieldPath::parse("attackDecisions.b"), true),
            )
            .await
            .unwrap();
        execute(&ctx, Authority::Host, "ROOM", RESOLVE, false).await.unwrap();
        let room = fetch_fresh(&ctx, "ROOM").await.unwrap();
        assert_eq!(room.players["c"].temperature, 10);
    }

    #[tokio::test]
    async fn gate_closed_means_not_due() {
        let (_store, ctx) = seeded(game_room(GameMode::Party)).await;
        vote(&ctx, "b", "X").await;
        let outcome = execute(&ctx, Authority::Host, "ROOM", FINISH, false).await.unwrap();
        assert_eq!(outcome, TransitionOutcome::NotDue);
    }

    #[tokio::test]
    async fn forced_finish_ignores_missing_votes() {
        let (_store, ctx) = seeded(game_room(GameMode::Party)).await;
        vote(&ctx, "b", "X").await;
        let outcome = execute(&ctx, Authority::Override, "ROOM", FINISH, true)
            .await
            .unwrap();
        assert!(matches!(outcome, TransitionOutcome::Applied(room) if room.status == RoomStatus::Result));
    }

    #[tokio::test]
    async fn racing_resolutions_heat_exactly_once() {
        let (_store, ctx) = seeded(game_room(GameMode::Party)).await;
        vote_all(&ctx).await;
        execute(&ctx, Authority::Host, "ROOM", FINISH, false).await.unwrap();
        ctx.store
            .update_room(
                "ROOM",
                RoomUpdate::new()
                    .append_unique(
                        FieldPath::parse("pendingAttacks.c"),
                        serde_json::to_value(PendingAttackEntity {
                            attacker: "b".into(),
                            damage: 20,
                            has_oil_bonus: false,
                        })
                        .unwrap(),
                    )
                    .set(FieldPath::parse("attackDecisions.b"), true),
            )
            .await
            .unwrap();

        let (host, trigger) = tokio::join!(
            execute(&ctx, Authority::Host, "ROOM", RESOLVE, false),
            execute(&ctx, Authority::ServerTrigger, "ROOM", RESOLVE, false),
        );
        let applied = [host.unwrap(), trigger.unwrap()]
            .into_iter()
            .filter(|outcome| matches!(outcome, TransitionOutcome::Applied(_)))
            .count();
        assert_eq!(applied, 1);

        let room = fetch_fresh(&ctx, "ROOM").await.unwrap();
        assert_eq!(room.players["c"].temperature, 30);
        assert_eq!(room.players["b"].temperature, 0);
        assert!(room.round_recap_shown);
        assert_eq!(room.attack_results["c"].total_damage, 30);
    }

    fn ready_to_advance() -> RoomEntity {
        let mut room = game_room(GameMode::Party);
        room.status = RoomStatus::Result;
        room.round_recap_shown = true;
        room.ready = vec!["a".into(), "b".into(), "c".into()];
        for name in ["a", "b", "c"] {
            room.votes.insert(
                name.into(),
                VoteEntity {
                    choice: "X".into(),
                    round_id: 1,
                },
            );
        }
        room
    }

    #[tokio::test]
    async fn advancing_rotates_hotseat_and_clears_round_fields() {
        let (_store, ctx) = seeded(ready_to_advance()).await;

        let advance = DueTransition::AdvanceRound { round_id: 1 };
        execute(&ctx, Authority::Host, "ROOM", advance, false).await.unwrap();
        let room = fetch_fresh(&ctx, "ROOM").await.unwrap();
        assert_eq!(room.status, RoomStatus::Game);
        assert_eq!(room.round_id, 2);
        assert_eq!(room.hotseat.as_deref(), Some("b"));
        assert!(room.votes.is_empty());
        assert!(room.ready.is_empty());
        assert!(!room.round_recap_shown);
        assert_eq!(room.used_questions, vec![0, 1]);
        assert_eq!(room.current_question.unwrap().prompt, "q1");
    }

    #[tokio::test]
    async fn advancing_past_the_last_question_starts_a_new_cycle() {
        let mut room = ready_to_advance();
        room.used_questions = vec![0, 1];
        let (_store, ctx) = seeded(room).await;

        let advance = DueTransition::AdvanceRound { round_id: 1 };
        execute(&ctx, Authority::Host, "ROOM", advance, false).await.unwrap();
        let room = fetch_fresh(&ctx, "ROOM").await.unwrap();
        assert_eq!(room.current_question.unwrap().prompt, "q0");
        assert_eq!(room.used_questions, vec![0]);
    }

    /// a is hotseat and picked X, b guessed X; c is already out.
    fn two_left_in_result() -> RoomEntity {
        let mut room = game_room(GameMode::Party);
        room.status = RoomStatus::Result;
        room.eliminated_players = vec!["c".into()];
        for (name, choice) in [("a", "X"), ("b", "X"), ("c", "Y")] {
            room.votes.insert(
                name.into(),
                VoteEntity {
                    choice: choice.into(),
                    round_id: 1,
                },
            );
        }
        room
    }

    fn queue_attack(room: &mut RoomEntity, attacker: &str, target: &str) {
        room.pending_attacks
            .entry(target.into())
            .or_default()
            .push(PendingAttackEntity {
                attacker: attacker.into(),
                damage: 20,
                has_oil_bonus: false,
            });
        room.attack_decisions.insert(attacker.into(), true);
    }

    #[tokio::test]
    async fn resolution_that_leaves_one_player_declares_winner_with_recap() {
        let mut room = two_left_in_result();
        room.players["a"].temperature = 90;
        queue_attack(&mut room, "b", "a");
        let (_store, ctx) = seeded(room).await;

        let outcome = execute(&ctx, Authority::Host, "ROOM", RESOLVE, false)
            .await
            .unwrap();
        let TransitionOutcome::Applied(room) = outcome else {
            panic!("expected applied, got {outcome:?}");
        };
        assert_eq!(room.status, RoomStatus::Winner);
        assert_eq!(room.winner.as_deref(), Some("b"));
        assert!(room.round_recap_shown);
        assert_eq!(room.players["a"].temperature, 110);
        assert_eq!(room.attack_results["a"].total_damage, 20);
        assert!(room.eliminated_players.contains(&"a".to_owned()));
    }

    #[tokio::test]
    async fn mirrored_attack_knocks_out_the_attacker() {
        let mut room = two_left_in_result();
        room.players["a"].inventory = vec![Item::Mirror];
        room.players["b"].temperature = 90;
        queue_attack(&mut room, "b", "a");
        let (_store, ctx) = seeded(room).await;

        execute(&ctx, Authority::ServerTrigger, "ROOM", RESOLVE, false)
            .await
            .unwrap();
        let room = fetch_fresh(&ctx, "ROOM").await.unwrap();
        assert_eq!(room.status, RoomStatus::Winner);
        assert_eq!(room.winner.as_deref(), Some("a"));
        assert!(room.round_recap_shown);
        assert_eq!(room.players["a"].temperature, 0);
        assert_eq!(room.players["b"].temperature, 110);
        assert!(room.players["a"].inventory.is_empty());
        assert!(room.attack_results["a"].attack_details[0].mirrored);
    }

    #[tokio::test]
    async fn advance_batch_with_one_active_player_finishes_the_game() {
        let mut room = two_left_in_result();
        room.round_recap_shown = true;
        room.players["b"].temperature = 100;
        let (store, ctx) = seeded(room.clone()).await;

        let update = advance_round(&room, ctx.questions.as_ref()).unwrap();
        let committed = store.update_room("ROOM", update).await.unwrap();
        assert_eq!(committed.status, RoomStatus::Winner);
        assert_eq!(committed.winner.as_deref(), Some("a"));
        assert_eq!(committed.round_id, 1);
    }

    #[tokio::test]
    async fn declare_winner_from_result() {
        let mut room = two_left_in_result();
        room.eliminated_players.push("b".into());
        let (_store, ctx) = seeded(room).await;

        let declare = DueTransition::DeclareWinner { round_id: 1 };
        let outcome = execute(&ctx, Authority::Watchdog, "ROOM", declare, false)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            TransitionOutcome::Applied(room)
                if room.status == RoomStatus::Winner && room.winner.as_deref() == Some("a")
        ));

        let again = execute(&ctx, Authority::Host, "ROOM", declare, false)
            .await
            .unwrap();
        assert_eq!(again, TransitionOutcome::Settled);
    }

    #[tokio::test]
    async fn boiling_over_to_one_player_declares_winner() {
        let mut room = game_room(GameMode::Party);
        room.players["b"].temperature = 95;
        room.players["c"].temperature = 95;
        let (_store, ctx) = seeded(room).await;
        vote(&ctx, "a", "X").await;
        vote(&ctx, "b", "Y").await;
        vote(&ctx, "c", "Y").await;

        execute(&ctx, Authority::Host, "ROOM", FINISH, false).await.unwrap();
        let room = fetch_fresh(&ctx, "ROOM").await.unwrap();
        assert_eq!(room.status, RoomStatus::Winner);
        assert_eq!(room.winner.as_deref(), Some("a"));
        assert_eq!(room.eliminated_players, vec!["b".to_owned(), "c".to_owned()]);
    }
}
