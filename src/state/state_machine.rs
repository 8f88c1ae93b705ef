use std::collections::HashMap;

use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{dao::models::RoomStatus, engine::DueTransition};

/// Events that move a room between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// Host starts the first round from the lobby.
    StartGame,
    /// Every active player voted; the truth is revealed.
    VotingComplete,
    /// Attacks were resolved; the room stays in `result` with its recap flag set.
    RoundResolved,
    /// Everyone acknowledged and is ready; the next round begins.
    NextRound,
    /// At most one active player remains.
    LastPlayerStanding,
    /// Host resets the room to a fresh lobby.
    Rematch,
}

impl From<DueTransition> for RoomEvent {
    fn from(due: DueTransition) -> Self {
        match due {
            DueTransition::FinishVoting { .. } => RoomEvent::VotingComplete,
            DueTransition::ResolveAttacks { .. } => RoomEvent::RoundResolved,
            DueTransition::AdvanceRound { .. } => RoomEvent::NextRound,
            DueTransition::DeclareWinner { .. } => RoomEvent::LastPlayerStanding,
        }
    }
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The status the room was in when the invalid event was received.
    pub from: RoomStatus,
    /// The event that cannot be applied from this status.
    pub event: RoomEvent,
}

/// Compute the status an event leads to, if the event is legal from `from`.
pub fn compute_transition(from: RoomStatus, event: RoomEvent) -> Result<RoomStatus, InvalidTransition> {
    let next = match (from, event) {
        (RoomStatus::Lobby, RoomEvent::StartGame) => RoomStatus::Game,
        (RoomStatus::Game, RoomEvent::VotingComplete) => RoomStatus::Result,
        (RoomStatus::Result, RoomEvent::RoundResolved) => RoomStatus::Result,
        (RoomStatus::Result, RoomEvent::NextRound) => RoomStatus::Game,
        (RoomStatus::Game | RoomStatus::Result, RoomEvent::LastPlayerStanding) => {
            RoomStatus::Winner
        }
        (_, RoomEvent::Rematch) => RoomStatus::Lobby,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

/// Errors that can occur when planning a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// The same transition for the same round is already in flight.
    AlreadyPending,
    /// The same transition for the same round already landed.
    AlreadyDone,
    /// The requested transition is not valid from the observed status.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is pending for this key.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is pending for this key.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned transition.
pub type PlanId = Uuid;

/// A transition that has been validated and scheduled but not yet confirmed.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Transition and round the plan belongs to.
    pub key: DueTransition,
    /// Status observed when planning.
    pub from: RoomStatus,
    /// Status the transition leads to.
    pub to: RoomStatus,
    /// Event that triggered this transition.
    pub event: RoomEvent,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

#[derive(Debug, Clone)]
enum Marker {
    Pending(Plan),
    Done,
}

/// Per-room record of which transitions this process has scheduled or completed,
/// keyed by transition kind and round.
#[derive(Debug, Default)]
pub struct TransitionLedger {
    markers: HashMap<DueTransition, Marker>,
}

impl TransitionLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `key`, observed while the room was in `from`. Fails if the same key is
    /// already pending or done, or if the transition is illegal from `from`.
    pub fn plan(&mut self, key: DueTransition, from: RoomStatus) -> Result<Plan, PlanError> {
        match self.markers.get(&key) {
            Some(Marker::Pending(_)) => return Err(PlanError::AlreadyPending),
            Some(Marker::Done) => return Err(PlanError::AlreadyDone),
            None => {}
        }

        let event = RoomEvent::from(key);
        let to = compute_transition(from, event).map_err(PlanError::InvalidTransition)?;
        let plan = Plan {
            id: Uuid::new_v4(),
            key,
            from,
            to,
            event,
            pending_since: Instant::now(),
        };
        self.markers.insert(key, Marker::Pending(plan.clone()));

        Ok(plan)
    }

    /// Confirm a pending plan. Returns the status the plan led to.
    pub fn apply(&mut self, key: DueTransition, plan_id: PlanId) -> Result<RoomStatus, ApplyError> {
        let Some(Marker::Pending(plan)) = self.markers.get(&key) else {
            return Err(ApplyError::NoPending);
        };
        if plan.id != plan_id {
            return Err(ApplyError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        let to = plan.to;
        self.markers.insert(key, Marker::Done);
        Ok(to)
    }

    /// Release a pending plan so the transition can be scheduled again.
    pub fn abort(&mut self, key: DueTransition, plan_id: PlanId) -> Result<(), AbortError> {
        let Some(Marker::Pending(plan)) = self.markers.get(&key) else {
            return Err(AbortError::NoPending);
        };
        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.markers.remove(&key);
        Ok(())
    }

    /// Whether `key` already landed.
    pub fn is_done(&self, key: DueTransition) -> bool {
        matches!(self.markers.get(&key), Some(Marker::Done))
    }

    /// Drop markers of rounds older than `round_id`.
    pub fn prune_before(&mut self, round_id: u64) {
        self.markers.retain(|key, _| key.round_id() >= round_id);
    }

    /// Number of markers currently held.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether the ledger holds no markers.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FINISH: DueTransition = DueTransition::FinishVoting { round_id: 1 };

    #[test]
    fn full_happy_path_through_a_round() {
        let mut status = RoomStatus::Lobby;
        for event in [
            RoomEvent::StartGame,
            RoomEvent::VotingComplete,
            RoomEvent::RoundResolved,
            RoomEvent::NextRound,
            RoomEvent::VotingComplete,
            RoomEvent::LastPlayerStanding,
        ] {
            status = compute_transition(status, event).unwrap();
        }
        assert_eq!(status, RoomStatus::Winner);
        assert_eq!(
            compute_transition(status, RoomEvent::Rematch).unwrap(),
            RoomStatus::Lobby
        );
    }

    #[test]
    fn invalid_transition_returns_error() {
        let err = compute_transition(RoomStatus::Lobby, RoomEvent::VotingComplete).unwrap_err();
        assert_eq!(err.from, RoomStatus::Lobby);
        assert_eq!(err.event, RoomEvent::VotingComplete);
        assert!(compute_transition(RoomStatus::Winner, RoomEvent::NextRound).is_err());
    }

    #[test]
    fn second_plan_for_same_round_is_rejected() {
        let mut ledger = TransitionLedger::new();
        let plan = ledger.plan(FINISH, RoomStatus::Game).unwrap();
        assert_eq!(plan.to, RoomStatus::Result);
        assert_eq!(
            ledger.plan(FINISH, RoomStatus::Game).unwrap_err(),
            PlanError::AlreadyPending
        );

        assert_eq!(ledger.apply(FINISH, plan.id).unwrap(), RoomStatus::Result);
        assert!(ledger.is_done(FINISH));
        assert_eq!(
            ledger.plan(FINISH, RoomStatus::Game).unwrap_err(),
            PlanError::AlreadyDone
        );

        // A later round is a different key.
        ledger
            .plan(DueTransition::FinishVoting { round_id: 2 }, RoomStatus::Game)
            .unwrap();
    }

    #[test]
    fn plan_from_wrong_status_is_invalid() {
        let mut ledger = TransitionLedger::new();
        let err = ledger.plan(FINISH, RoomStatus::Result).unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition(_)));
        assert!(ledger.is_empty());
    }

    #[test]
    fn abort_clears_pending() {
        let mut ledger = TransitionLedger::new();
        let plan = ledger.plan(FINISH, RoomStatus::Game).unwrap();
        assert!(matches!(
            ledger.abort(FINISH, Uuid::new_v4()),
            Err(AbortError::IdMismatch { .. })
        ));
        ledger.abort(FINISH, plan.id).unwrap();
        assert!(ledger.is_empty());
        assert_eq!(ledger.apply(FINISH, plan.id), Err(ApplyError::NoPending));
    }

    #[test]
    fn pruning_forgets_older_rounds() {
        let mut ledger = TransitionLedger::new();
        let plan = ledger.plan(FINISH, RoomStatus::Game).unwrap();
        ledger.apply(FINISH, plan.id).unwrap();
        ledger
            .plan(DueTransition::ResolveAttacks { round_id: 2 }, RoomStatus::Result)
            .unwrap();

        ledger.prune_before(2);
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.is_done(FINISH));
    }
}
