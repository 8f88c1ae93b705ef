use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    dao::{models::RoomEntity, room_store::RoomFeed},
    engine::{DueTransition, due_transition},
    services::transitions::{self, Authority, TransitionContext, TransitionOutcome},
};

/// Server-side safety net: evaluates every committed mutation of every room and performs
/// whatever transition is due, independently of any host runtime.
#[derive(Clone)]
pub struct ServerTrigger {
    ctx: TransitionContext,
    debounce: Duration,
    in_flight: Arc<DashMap<String, DueTransition>>,
}

impl ServerTrigger {
    /// Trigger waiting `debounce` between a transition becoming due and executing it.
    pub fn new(ctx: TransitionContext, debounce: Duration) -> Self {
        Self {
            ctx,
            debounce,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Subscribe to the store's global feed and process it in the background.
    pub fn spawn(self) -> JoinHandle<()> {
        let feed = self.ctx.store.mutations();
        tokio::spawn(self.run(feed))
    }

    /// Consume the mutation feed until it closes.
    pub async fn run(self, mut feed: RoomFeed) {
        info!("server trigger following room mutations");
        loop {
            match feed.recv().await {
                Ok(change) => match change.room {
                    Some(room) => self.on_mutation(&change.room_id, &room),
                    None => {
                        self.in_flight.remove(&change.room_id);
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "server trigger lagged behind the mutation feed");
                    self.catch_up().await;
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("mutation feed closed; server trigger stopping");
    }

    /// Re-read every stored room after snapshots were dropped from the feed.
    async fn catch_up(&self) {
        let room_ids = match self.ctx.store.list_rooms().await {
            Ok(room_ids) => room_ids,
            Err(err) => {
                warn!(error = %err, "failed to list rooms after lagging");
                return;
            }
        };
        debug!(rooms = room_ids.len(), "re-evaluating rooms after lagging");
        for room_id in room_ids {
            match transitions::fetch_fresh(&self.ctx, &room_id).await {
                Ok(room) => self.on_mutation(&room_id, &room),
                Err(err) => {
                    debug!(room = %room_id, error = %err, "skipping room during catch-up");
                }
            }
        }
    }

    fn on_mutation(&self, room_id: &str, room: &RoomEntity) {
        let Some(due) = due_transition(room) else {
            return;
        };
        match self.in_flight.entry(room_id.to_owned()) {
            Entry::Occupied(slot) if *slot.get() == due => return,
            Entry::Occupied(mut slot) => {
                slot.insert(due);
            }
            Entry::Vacant(slot) => {
                slot.insert(due);
            }
        }

        let trigger = self.clone();
        let room_id = room_id.to_owned();
        tokio::spawn(async move {
            sleep(trigger.debounce).await;
            match transitions::execute(&trigger.ctx, Authority::ServerTrigger, &room_id, due, false)
                .await
            {
                Ok(TransitionOutcome::Applied(_)) => {}
                Ok(outcome) => {
                    debug!(room = %room_id, transition = due.name(), ?outcome, "nothing to do");
                }
                Err(err) => {
                    warn!(
                        room = %room_id,
                        transition = due.name(),
                        error = %err,
                        "server-side transition failed"
                    );
                }
            }
            trigger
                .in_flight
                .remove_if(&room_id, |_, scheduled| *scheduled == due);
        });
    }
}
