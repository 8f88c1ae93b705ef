/// Status table and transition bookkeeping.
pub mod state_machine;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::{
    sync::{Mutex, RwLock, watch},
    task::JoinHandle,
};
use tracing::info;

use crate::{
    config::AppConfig,
    dao::room_store::RoomStore,
    error::ServiceError,
    services::{
        questions::{Catalogue, QuestionSource},
        retry::RetryExecutor,
        round_controller::RoundController,
        server_trigger::ServerTrigger,
        transitions::TransitionContext,
        watchdog::RecoveryWatchdog,
    },
};

/// Handle passed to every route and background task.
pub type SharedState = Arc<AppState>;

/// Background tasks driving one room on behalf of its host.
struct HostRuntime {
    controller: JoinHandle<()>,
    watchdog: JoinHandle<()>,
}

impl HostRuntime {
    fn abort(&self) {
        self.controller.abort();
        self.watchdog.abort();
    }
}

/// Central application state: the room store handle, configuration and the background
/// authorities advancing rooms.
pub struct AppState {
    room_store: RwLock<Option<Arc<dyn RoomStore>>>,
    config: AppConfig,
    questions: Arc<dyn QuestionSource>,
    executor: RetryExecutor,
    hosts: DashMap<String, HostRuntime>,
    server_trigger: Mutex<Option<JoinHandle<()>>>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let questions = Arc::new(Catalogue::new(config.questions().to_vec()));
        Arc::new(Self {
            room_store: RwLock::new(None),
            executor: RetryExecutor::new(config.retry),
            config,
            questions,
            hosts: DashMap::new(),
            server_trigger: Mutex::new(None),
            degraded: degraded_tx,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Shared retry executor and its in-flight registry.
    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// Question source used when a round starts.
    pub fn questions(&self) -> &Arc<dyn QuestionSource> {
        &self.questions
    }

    /// Obtain a handle to the current room store, if one is installed.
    pub async fn room_store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.room_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current room store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_room_store(&self) -> Result<Arc<dyn RoomStore>, ServiceError> {
        self.room_store().await.ok_or(ServiceError::Degraded)
    }

    /// Bundle the collaborators transitions need.
    pub async fn transition_context(&self) -> Result<TransitionContext, ServiceError> {
        Ok(TransitionContext {
            store: self.require_room_store().await?,
            executor: self.executor.clone(),
            questions: self.questions.clone(),
        })
    }

    /// Install a new room store, leave degraded mode and restart the authorities on it.
    pub async fn install_room_store(&self, store: Arc<dyn RoomStore>) {
        {
            let mut guard = self.room_store.write().await;
            *guard = Some(store.clone());
        }
        self.update_degraded(false);

        let ctx = TransitionContext {
            store,
            executor: self.executor.clone(),
            questions: self.questions.clone(),
        };
        if self.config.roles.server_trigger {
            let handle = ServerTrigger::new(ctx.clone(), self.config.timing.debounce).spawn();
            if let Some(previous) = self.server_trigger.lock().await.replace(handle) {
                previous.abort();
            }
        }

        let rooms: Vec<String> = self.hosts.iter().map(|entry| entry.key().clone()).collect();
        for room_id in rooms {
            self.spawn_host_with(&room_id, ctx.clone());
        }
    }

    /// Remove the current room store and enter degraded mode.
    pub async fn clear_room_store(&self) {
        {
            let mut guard = self.room_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Start the host-side controller and watchdog for a room, if this process hosts rooms.
    pub async fn spawn_host(&self, room_id: &str) -> Result<(), ServiceError> {
        if !self.config.roles.host_controllers {
            return Ok(());
        }
        let ctx = self.transition_context().await?;
        self.spawn_host_with(room_id, ctx);
        Ok(())
    }

    fn spawn_host_with(&self, room_id: &str, ctx: TransitionContext) {
        let timing = self.config.timing;
        let runtime = HostRuntime {
            controller: RoundController::new(room_id, ctx.clone(), timing.debounce).spawn(),
            watchdog: RecoveryWatchdog::new(room_id, ctx, timing).spawn(),
        };
        if let Some(previous) = self.hosts.insert(room_id.to_owned(), runtime) {
            previous.abort();
        }
        info!(room = %room_id, "host runtime started");
    }

    /// Stop the host-side tasks of a room and forget its bookkeeping.
    pub fn stop_host(&self, room_id: &str) {
        if let Some((_, runtime)) = self.hosts.remove(room_id) {
            runtime.abort();
        }
        self.executor.registry().forget_room(room_id);
    }

    /// Number of rooms hosted by this process.
    pub fn hosted_room_count(&self) -> usize {
        self.hosts.len()
    }

    /// Whether this process hosts `room_id`.
    pub fn hosts_room(&self, room_id: &str) -> bool {
        self.hosts.contains_key(room_id)
    }
}
