use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    config::TimingConfig,
    dao::models::RoomEntity,
    engine::{DueTransition, due_transition},
    services::transitions::{self, Authority, TransitionContext, TransitionOutcome},
};

/// What a single watchdog pass concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// Nothing stalled.
    Healthy,
    /// A stalled mutation was detected and the due transition replayed.
    Replayed,
    /// A transition stayed due past the condition threshold and was forced.
    Forced,
    /// The store could not be reached; try again next tick.
    Unreachable,
    /// The room no longer exists; the watchdog stops.
    RoomGone,
}

/// Periodic self-check of one room on the host side.
pub struct RecoveryWatchdog {
    room_id: String,
    ctx: TransitionContext,
    timing: TimingConfig,
    /// Transition seen due on the previous pass, and since when.
    overdue: Option<(DueTransition, Instant)>,
}

impl RecoveryWatchdog {
    /// Watchdog for `room_id` ticking at `timing.watchdog_interval`.
    pub fn new(room_id: impl Into<String>, ctx: TransitionContext, timing: TimingConfig) -> Self {
        Self {
            room_id: room_id.into(),
            ctx,
            timing,
            overdue: None,
        }
    }

    /// Run until the room disappears.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Tick until the room disappears.
    pub async fn run(mut self) {
        let mut ticker = interval(self.timing.watchdog_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if self.check().await == WatchdogOutcome::RoomGone {
                info!(room = %self.room_id, "room gone; watchdog stopping");
                break;
            }
        }
    }

    /// Run both checks once.
    pub async fn check(&mut self) -> WatchdogOutcome {
        if self.mutations_stalled() {
            return self.replay().await;
        }
        self.check_condition().await
    }

    /// In-flight operations exist and the store has been silent for longer than the
    /// liveness threshold.
    fn mutations_stalled(&self) -> bool {
        let registry = self.ctx.executor.registry();
        let pending = registry.pending_for(&self.room_id);
        let Some(oldest) = pending.first() else {
            return false;
        };
        let silent_since = registry
            .last_success(&self.room_id)
            .unwrap_or(oldest.started_at);
        silent_since.elapsed() > self.timing.liveness_threshold
    }

    /// Probe, re-read and redo whatever the fresh record says is due.
    async fn replay(&mut self) -> WatchdogOutcome {
        match timeout(self.timing.probe_timeout, self.ctx.store.health_check()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(room = %self.room_id, error = %err, "watchdog probe failed");
                return WatchdogOutcome::Unreachable;
            }
            Err(_) => {
                warn!(room = %self.room_id, "watchdog probe timed out");
                return WatchdogOutcome::Unreachable;
            }
        }

        let room = match self.read().await {
            Ok(room) => room,
            Err(outcome) => return outcome,
        };
        let cleared = self.ctx.executor.registry().clear_exhausted(&self.room_id);
        info!(room = %self.room_id, cleared, "store reachable again; replaying due transition");

        let Some(due) = due_transition(&room) else {
            return WatchdogOutcome::Healthy;
        };
        match transitions::execute(&self.ctx, Authority::Watchdog, &self.room_id, due, false).await
        {
            Ok(TransitionOutcome::Applied(_)) => WatchdogOutcome::Replayed,
            Ok(_) => WatchdogOutcome::Healthy,
            Err(err) => {
                warn!(room = %self.room_id, error = %err, "watchdog replay failed");
                WatchdogOutcome::Unreachable
            }
        }
    }

    /// Force a transition that has been due for too long.
    async fn check_condition(&mut self) -> WatchdogOutcome {
        let room = match self.read().await {
            Ok(room) => room,
            Err(outcome) => return outcome,
        };
        let Some(due) = due_transition(&room) else {
            self.overdue = None;
            return WatchdogOutcome::Healthy;
        };

        let since = match self.overdue {
            Some((seen, since)) if seen == due => since,
            _ => {
                self.overdue = Some((due, Instant::now()));
                return WatchdogOutcome::Healthy;
            }
        };
        if since.elapsed() < self.timing.condition_threshold {
            return WatchdogOutcome::Healthy;
        }

        warn!(
            room = %self.room_id,
            round = due.round_id(),
            transition = due.name(),
            overdue = ?since.elapsed(),
            "transition overdue; forcing it"
        );
        self.overdue = None;
        match transitions::execute(&self.ctx, Authority::Watchdog, &self.room_id, due, true).await {
            Ok(TransitionOutcome::Applied(_)) => WatchdogOutcome::Forced,
            Ok(outcome) => {
                debug!(room = %self.room_id, ?outcome, "forced transition was not needed");
                WatchdogOutcome::Healthy
            }
            Err(err) => {
                warn!(room = %self.room_id, error = %err, "forced transition failed");
                WatchdogOutcome::Unreachable
            }
        }
    }

    /// Direct read of the record, bypassing the retry registry.
    async fn read(&self) -> Result<RoomEntity, WatchdogOutcome> {
        match self.ctx.store.fetch_room(&self.room_id).await {
            Ok(Some(room)) => Ok(room),
            Ok(None) => Err(WatchdogOutcome::RoomGone),
            Err(err) => {
                debug!(room = %self.room_id, error = %err, "watchdog read failed");
                Err(WatchdogOutcome::Unreachable)
            }
        }
    }
}
