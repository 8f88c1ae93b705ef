//! Guard conditions over a room snapshot. Every authority (host controller, server trigger,
//! watchdog) evaluates exactly these functions, so they agree on what is due.

use crate::dao::models::{GameMode, RoomEntity, RoomStatus, VoteEntity};

/// Heat added for a wrong guess.
pub const PENALTY_DAMAGE: u32 = 10;
/// Attacker label shown for wrong-guess penalties in round recaps.
pub const PENALTY_LABEL: &str = "Strafhitze";
/// Heat removed when an ice item triggers.
pub const ICE_COOLING: u32 = 20;

/// When the wrong-guess penalty reaches the player's temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyPolicy {
    /// Added as soon as the wrong guess is established (voting closes).
    Eager,
    /// Added together with the attacks during resolution.
    Deferred,
}

impl From<GameMode> for PenaltyPolicy {
    fn from(mode: GameMode) -> Self {
        match mode {
            GameMode::Party => PenaltyPolicy::Eager,
            GameMode::Classic => PenaltyPolicy::Deferred,
        }
    }
}

/// Transition the room is currently owed, tagged with the round it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DueTransition {
    /// game -> result: every active player has voted.
    FinishVoting {
        /// Round the transition belongs to.
        round_id: u64,
    },
    /// result, unresolved -> result, resolved: every decision is in.
    ResolveAttacks {
        /// Round the transition belongs to.
        round_id: u64,
    },
    /// result, resolved -> game (or winner): everyone acknowledged and is ready.
    AdvanceRound {
        /// Round the transition belongs to.
        round_id: u64,
    },
    /// any -> winner: at most one active player is left.
    DeclareWinner {
        /// Round the transition belongs to.
        round_id: u64,
    },
}

impl DueTransition {
    /// Round the transition belongs to.
    pub fn round_id(self) -> u64 {
        match self {
            DueTransition::FinishVoting { round_id }
            | DueTransition::ResolveAttacks { round_id }
            | DueTransition::AdvanceRound { round_id }
            | DueTransition::DeclareWinner { round_id } => round_id,
        }
    }

    /// Short stable name used in operation identifiers and logs.
    pub fn name(self) -> &'static str {
        match self {
            DueTransition::FinishVoting { .. } => "finish-voting",
            DueTransition::ResolveAttacks { .. } => "resolve-attacks",
            DueTransition::AdvanceRound { .. } => "advance-round",
            DueTransition::DeclareWinner { .. } => "declare-winner",
        }
    }
}

/// A player still in the game: not eliminated and below the room's maximum temperature.
pub fn is_active(room: &RoomEntity, name: &str) -> bool {
    if room.eliminated_players.iter().any(|out| out == name) {
        return false;
    }
    room.players
        .get(name)
        .is_some_and(|player| player.temperature < room.config.max_temperature)
}

/// Active players in join order.
pub fn active_players(room: &RoomEntity) -> Vec<&str> {
    room.players
        .keys()
        .map(String::as_str)
        .filter(|name| is_active(room, name))
        .collect()
}

/// A player's vote, only if it was cast in the current round.
pub fn current_vote<'a>(room: &'a RoomEntity, name: &str) -> Option<&'a VoteEntity> {
    room.votes
        .get(name)
        .filter(|vote| vote.round_id == room.round_id)
}

/// The hotseat's private choice for this round.
pub fn truth(room: &RoomEntity) -> Option<&str> {
    let hotseat = room.hotseat.as_deref()?;
    current_vote(room, hotseat).map(|vote| vote.choice.as_str())
}

/// Whether a non-hotseat player guessed correctly. `None` when either side has not voted.
pub fn guessed_correctly(room: &RoomEntity, name: &str) -> Option<bool> {
    if room.hotseat.as_deref() == Some(name) {
        return None;
    }
    let truth = truth(room)?;
    current_vote(room, name).map(|vote| vote.choice == truth)
}

/// Every active player, hotseat included, voted in the current round.
pub fn all_active_voted(room: &RoomEntity) -> bool {
    let active = active_players(room);
    !active.is_empty()
        && active
            .iter()
            .all(|name| current_vote(room, name).is_some())
}

/// Active players who may attack this round: correct guessers other than the hotseat.
pub fn eligible_attackers(room: &RoomEntity) -> Vec<&str> {
    active_players(room)
        .into_iter()
        .filter(|name| guessed_correctly(room, name) == Some(true))
        .collect()
}

/// Players whose guess differs from the truth. They sit the attack phase out.
pub fn wrong_guessers(room: &RoomEntity) -> Vec<&str> {
    room.players
        .keys()
        .map(String::as_str)
        .filter(|name| guessed_correctly(room, name) == Some(false))
        .collect()
}

/// Every eligible attacker and every disqualified active player has a recorded decision.
pub fn decisions_complete(room: &RoomEntity) -> bool {
    let decided = |name: &&str| room.attack_decisions.get(*name).copied().unwrap_or(false);
    let eligible_done = eligible_attackers(room).iter().all(decided);
    let disqualified_done = wrong_guessers(room)
        .iter()
        .filter(|name| is_active(room, name))
        .all(decided);
    eligible_done && disqualified_done
}

/// Gate for leaving `result`: resolved, everyone voted, acknowledged their recap, and ready.
pub fn round_complete(room: &RoomEntity) -> bool {
    if !room.round_recap_shown {
        return false;
    }
    active_players(room).iter().all(|name| {
        let voted = current_vote(room, name).is_some();
        let acknowledged = !room.attack_results.contains_key(*name)
            || room.popup_confirmed.iter().any(|confirmed| confirmed == *name);
        let ready = room.ready.iter().any(|entry| entry == *name);
        voted && acknowledged && ready
    })
}

/// Lobby gate for the host's start action.
pub fn lobby_ready(room: &RoomEntity) -> bool {
    let active = active_players(room);
    active.len() >= 2
        && active
            .iter()
            .all(|name| room.ready.iter().any(|entry| entry == *name))
}

/// Round-robin successor of the current hotseat among active players. If the previous
/// hotseat is no longer active the rotation starts over from index 0.
pub fn next_hotseat(room: &RoomEntity) -> Option<String> {
    let active = active_players(room);
    if active.is_empty() {
        return None;
    }
    let previous = room
        .hotseat
        .as_deref()
        .and_then(|hotseat| active.iter().position(|name| *name == hotseat))
        .unwrap_or(0);
    Some(active[(previous + 1) % active.len()].to_owned())
}

/// The transition the room's status leads to next, ignoring completeness gates.
/// This is what a host override executes.
pub fn next_transition(room: &RoomEntity) -> Option<DueTransition> {
    let round_id = room.round_id;
    match room.status {
        RoomStatus::Lobby | RoomStatus::Winner => None,
        RoomStatus::Game | RoomStatus::Result if active_players(room).len() <= 1 => {
            Some(DueTransition::DeclareWinner { round_id })
        }
        RoomStatus::Game => Some(DueTransition::FinishVoting { round_id }),
        RoomStatus::Result if !room.round_recap_shown => {
            Some(DueTransition::ResolveAttacks { round_id })
        }
        RoomStatus::Result => Some(DueTransition::AdvanceRound { round_id }),
    }
}

/// Evaluate which automatic transition, if any, the snapshot currently owes.
pub fn due_transition(room: &RoomEntity) -> Option<DueTransition> {
    let next = next_transition(room)?;
    let gate_open = match next {
        DueTransition::FinishVoting { .. } => all_active_voted(room),
        DueTransition::ResolveAttacks { .. } => decisions_complete(room),
        DueTransition::AdvanceRound { .. } => round_complete(room),
        DueTransition::DeclareWinner { .. } => true,
    };
    gate_open.then_some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::PlayerEntity;

    fn room_with(players: &[&str]) -> RoomEntity {
        let mut room = RoomEntity {
            host: players[0].into(),
            round_id: 1,
            status: RoomStatus::Game,
            hotseat: Some(players[0].into()),
            ..RoomEntity::default()
        };
        for name in players {
            room.players.insert((*name).into(), PlayerEntity::default());
        }
        room
    }

    fn vote(room: &mut RoomEntity, name: &str, choice: &str) {
        room.votes.insert(
            name.into(),
            VoteEntity {
                choice: choice.into(),
                round_id: room.round_id,
            },
        );
    }

    #[test]
    fn eliminated_and_boiling_players_are_inactive() {
        let mut room = room_with(&["a", "b", "c"]);
        room.eliminated_players.push("b".into());
        room.players.get_mut("c").unwrap().temperature = 100;
        assert_eq!(active_players(&room), vec!["a"]);
    }

    #[test]
    fn voting_gate_requires_the_hotseat() {
        let mut room = room_with(&["a", "b", "c"]);
        vote(&mut room, "b", "X");
        vote(&mut room, "c", "Y");
        assert!(!all_active_voted(&room));
        assert_eq!(due_transition(&room), None);
        assert_eq!(
            next_transition(&room),
            Some(DueTransition::FinishVoting { round_id: 1 })
        );

        vote(&mut room, "a", "X");
        assert_eq!(
            due_transition(&room),
            Some(DueTransition::FinishVoting { round_id: 1 })
        );
    }

    #[test]
    fn stale_votes_do_not_count() {
        let mut room = room_with(&["a", "b"]);
        room.votes.insert(
            "a".into(),
            VoteEntity {
                choice: "X".into(),
                round_id: 0,
            },
        );
        vote(&mut room, "b", "X");
        assert!(!all_active_voted(&room));
    }

    #[test]
    fn wrong_guessers_and_attackers_split_on_truth() {
        let mut room = room_with(&["a", "b", "c"]);
        vote(&mut room, "a", "X");
        vote(&mut room, "b", "X");
        vote(&mut room, "c", "Y");
        assert_eq!(eligible_attackers(&room), vec!["b"]);
        assert_eq!(wrong_guessers(&room), vec!["c"]);
    }

    #[test]
    fn resolution_waits_for_every_decision() {
        let mut room = room_with(&["a", "b", "c"]);
        room.status = RoomStatus::Result;
        vote(&mut room, "a", "X");
        vote(&mut room, "b", "X");
        vote(&mut room, "c", "Y");
        room.attack_decisions.insert("c".into(), true);
        assert_eq!(due_transition(&room), None);

        room.attack_decisions.insert("b".into(), true);
        assert_eq!(
            due_transition(&room),
            Some(DueTransition::ResolveAttacks { round_id: 1 })
        );
    }

    #[test]
    fn advance_requires_ack_and_ready_from_everyone() {
        let mut room = room_with(&["a", "b"]);
        room.status = RoomStatus::Result;
        room.round_recap_shown = true;
        vote(&mut room, "a", "X");
        vote(&mut room, "b", "X");
        room.attack_results.insert("b".into(), Default::default());
        room.ready = vec!["a".into(), "b".into()];
        assert_eq!(due_transition(&room), None);

        room.popup_confirmed.push("b".into());
        assert_eq!(
            due_transition(&room),
            Some(DueTransition::AdvanceRound { round_id: 1 })
        );
    }

    #[test]
    fn last_player_standing_is_due_a_win() {
        let mut room = room_with(&["a", "b"]);
        room.eliminated_players.push("b".into());
        assert_eq!(
            due_transition(&room),
            Some(DueTransition::DeclareWinner { round_id: 1 })
        );
        room.status = RoomStatus::Winner;
        assert_eq!(due_transition(&room), None);
    }

    #[test]
    fn hotseat_rotates_over_active_players() {
        let mut room = room_with(&["a", "b", "c"]);
        assert_eq!(next_hotseat(&room).as_deref(), Some("b"));

        room.hotseat = Some("c".into());
        assert_eq!(next_hotseat(&room).as_deref(), Some("a"));

        // Previous hotseat eliminated: start over from index 0 and advance.
        room.hotseat = Some("b".into());
        room.eliminated_players.push("b".into());
        assert_eq!(next_hotseat(&room).as_deref(), Some("c"));
    }

    #[test]
    fn penalty_policy_follows_game_mode() {
        assert_eq!(PenaltyPolicy::from(GameMode::Party), PenaltyPolicy::Eager);
        assert_eq!(
            PenaltyPolicy::from(GameMode::Classic),
            PenaltyPolicy::Deferred
        );
    }
}
