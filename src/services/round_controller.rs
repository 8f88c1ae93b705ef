use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, broadcast::error::RecvError},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info, warn};

use crate::{
    dao::{models::RoomEntity, storage::StorageError},
    engine::due_transition,
    services::transitions::{self, Authority, TransitionContext, TransitionOutcome},
    state::state_machine::{Plan, PlanError, TransitionLedger},
};

/// Host-side driver of one room's automatic transitions.
///
/// Each snapshot is re-evaluated from scratch. A due transition is reserved in the private
/// ledger under its (kind, round) key before the debounced mutation is scheduled, so repeated
/// notifications for the same round never schedule it twice.
#[derive(Clone)]
pub struct RoundController {
    room_id: String,
    ctx: TransitionContext,
    debounce: Duration,
    ledger: Arc<Mutex<TransitionLedger>>,
}

impl RoundController {
    /// Controller for `room_id` waiting `debounce` before acting on a due transition.
    pub fn new(room_id: impl Into<String>, ctx: TransitionContext, debounce: Duration) -> Self {
        Self {
            room_id: room_id.into(),
            ctx,
            debounce,
            ledger: Arc::new(Mutex::new(TransitionLedger::new())),
        }
    }

    /// Ledger of scheduled and completed transitions.
    pub fn ledger(&self) -> &Arc<Mutex<TransitionLedger>> {
        &self.ledger
    }

    /// Run the controller in the background until the room disappears.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Follow the room's change feed until the room is deleted.
    pub async fn run(self) {
        // Subscribe before the first read so no commit falls between the two.
        let mut feed = self.ctx.store.observe(&self.room_id);
        if !self.refresh().await {
            return;
        }

        loop {
            match feed.recv().await {
                Ok(change) => match change.room {
                    Some(room) => self.on_snapshot(&room).await,
                    None => {
                        info!(room = %self.room_id, "room deleted; round controller stopping");
                        break;
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    debug!(room = %self.room_id, skipped, "controller lagged; re-reading room");
                    if !self.refresh().await {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Re-read the room and evaluate it. Returns `false` once the room is gone.
    async fn refresh(&self) -> bool {
        match transitions::fetch_fresh(&self.ctx, &self.room_id).await {
            Ok(room) => {
                self.on_snapshot(&room).await;
                true
            }
            Err(StorageError::RoomNotFound { .. }) => {
                info!(room = %self.room_id, "room not found; round controller stopping");
                false
            }
            Err(err) => {
                warn!(room = %self.room_id, error = %err, "failed to read room; waiting for the next snapshot");
                true
            }
        }
    }

    async fn on_snapshot(&self, room: &RoomEntity) {
        let plan = {
            let mut ledger = self.ledger.lock().await;
            ledger.prune_before(room.round_id);
            let Some(due) = due_transition(room) else {
                return;
            };
            match ledger.plan(due, room.status) {
                Ok(plan) => plan,
                Err(PlanError::AlreadyPending | PlanError::AlreadyDone) => return,
                Err(PlanError::InvalidTransition(invalid)) => {
                    warn!(room = %self.room_id, error = %invalid, "due transition rejected by the status table");
                    return;
                }
            }
        };

        debug!(
            room = %self.room_id,
            round = plan.key.round_id(),
            transition = plan.key.name(),
            "transition scheduled"
        );
        let controller = self.clone();
        tokio::spawn(async move { controller.run_plan(plan).await });
    }

    async fn run_plan(&self, plan: Plan) {
        sleep(self.debounce).await;
        let outcome =
            transitions::execute(&self.ctx, Authority::Host, &self.room_id, plan.key, false).await;

        let mut ledger = self.ledger.lock().await;
        let settled = match outcome {
            Ok(TransitionOutcome::Applied(_) | TransitionOutcome::Settled) => true,
            Ok(TransitionOutcome::NotDue) => false,
            Err(err) => {
                warn!(
                    room = %self.room_id,
                    transition = plan.key.name(),
                    error = %err,
                    "transition failed; leaving it to the watchdog"
                );
                false
            }
        };

        if settled {
            if let Err(err) = ledger.apply(plan.key, plan.id) {
                debug!(room = %self.room_id, error = ?err, "ledger entry already pruned");
            }
        } else if let Err(err) = ledger.abort(plan.key, plan.id) {
            debug!(room = %self.room_id, error = ?err, "ledger entry already pruned");
        }
    }
}
