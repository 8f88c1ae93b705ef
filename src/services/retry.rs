use std::{future::Future, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dao::storage::StorageResult;

/// Bounds applied to every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included.
    pub max_attempts: u32,
    /// Backoff unit; attempt `n` waits `n × base_delay` before the next try.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Linear backoff after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Identity of a mutation as seen by the registry and in logs.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Room the mutation targets.
    pub room_id: String,
    /// What is being done, e.g. `finish-voting:3`.
    pub label: String,
}

impl Operation {
    /// Name an operation on `room_id`.
    pub fn new(room_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            label: label.into(),
        }
    }
}

/// Registry entry for a mutation that has not settled yet.
#[derive(Debug, Clone)]
pub struct InFlightOperation {
    /// Registry key.
    pub id: Uuid,
    /// Room the mutation targets.
    pub room_id: String,
    /// Operation label.
    pub label: String,
    /// When the first attempt began.
    pub started_at: Instant,
    /// Attempts made so far.
    pub attempts: u32,
    /// All attempts failed; the entry stays until the watchdog clears it.
    pub exhausted: bool,
}

/// In-flight mutations and the last time each room's store accepted a call.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    operations: DashMap<Uuid, InFlightOperation>,
    last_success: DashMap<String, Instant>,
}

impl InFlightRegistry {
    fn register(&self, operation: &Operation) -> Uuid {
        let id = Uuid::new_v4();
        self.operations.insert(
            id,
            InFlightOperation {
                id,
                room_id: operation.room_id.clone(),
                label: operation.label.clone(),
                started_at: Instant::now(),
                attempts: 0,
                exhausted: false,
            },
        );
        id
    }

    fn record_attempt(&self, id: Uuid, attempt: u32) {
        if let Some(mut entry) = self.operations.get_mut(&id) {
            entry.attempts = attempt;
        }
    }

    fn settle(&self, id: Uuid, room_id: &str) {
        self.operations.remove(&id);
        self.last_success.insert(room_id.to_owned(), Instant::now());
    }

    fn exhaust(&self, id: Uuid) {
        if let Some(mut entry) = self.operations.get_mut(&id) {
            entry.exhausted = true;
        }
    }

    /// Operations registered for a room, oldest first.
    pub fn pending_for(&self, room_id: &str) -> Vec<InFlightOperation> {
        let mut pending: Vec<_> = self
            .operations
            .iter()
            .filter(|entry| entry.room_id == room_id)
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by_key(|operation| operation.started_at);
        pending
    }

    /// Last time a mutation for the room reached the store.
    pub fn last_success(&self, room_id: &str) -> Option<Instant> {
        self.last_success.get(room_id).map(|entry| *entry)
    }

    /// Drop every exhausted entry of a room once its work has been replayed.
    pub fn clear_exhausted(&self, room_id: &str) -> usize {
        let before = self.operations.len();
        self.operations
            .retain(|_, operation| !(operation.room_id == room_id && operation.exhausted));
        before.saturating_sub(self.operations.len())
    }

    /// Forget everything about a deleted room.
    pub fn forget_room(&self, room_id: &str) {
        self.operations
            .retain(|_, operation| operation.room_id != room_id);
        self.last_success.remove(room_id);
    }
}

/// Runs store mutations with bounded linear-backoff retries.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    registry: Arc<InFlightRegistry>,
}

impl RetryExecutor {
    /// Executor with its own empty registry.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            registry: Arc::new(InFlightRegistry::default()),
        }
    }

    /// Operations that have not settled yet.
    pub fn registry(&self) -> &Arc<InFlightRegistry> {
        &self.registry
    }

    /// Run `attempt` until it succeeds, fails fatally or the attempt budget is spent.
    ///
    /// Fatal errors and successes both count as contact with the store. Exhausted operations
    /// remain registered so the watchdog can notice the stall.
    pub async fn execute<T, F, Fut>(&self, operation: Operation, mut attempt: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let id = self.registry.register(&operation);
        let mut number = 1;

        loop {
            self.registry.record_attempt(id, number);
            match attempt().await {
                Ok(value) => {
                    self.registry.settle(id, &operation.room_id);
                    if number > 1 {
                        debug!(
                            room = %operation.room_id,
                            operation = %operation.label,
                            attempts = number,
                            "mutation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && number < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(number);
                    warn!(
                        room = %operation.room_id,
                        operation = %operation.label,
                        attempt = number,
                        ?delay,
                        error = %err,
                        "mutation failed; retrying"
                    );
                    sleep(delay).await;
                    number += 1;
                }
                Err(err) if err.is_retryable() => {
                    self.registry.exhaust(id);
                    warn!(
                        room = %operation.room_id,
                        operation = %operation.label,
                        attempts = number,
                        error = %err,
                        "mutation retries exhausted; leaving it to the watchdog"
                    );
                    return Err(err);
                }
                Err(err) => {
                    self.registry.settle(id, &operation.room_id);
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::dao::{
        models::RoomEntity,
        patch::RoomUpdate,
        room_store::{RoomStore, memory::MemoryRoomStore},
        storage::StorageError,
    };

    fn executor() -> RetryExecutor {
        RetryExecutor::new(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        })
    }

    async fn store_with_room() -> MemoryRoomStore {
        let store = MemoryRoomStore::new();
        store
            .create_room(
                "ABCD",
                RoomEntity {
                    host: "alice".into(),
                    ..RoomEntity::default()
                },
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_with_linear_backoff() {
        let store = store_with_room().await;
        store.inject_failures(2);
        let executor = executor();

        let started = Instant::now();
        executor
            .execute(Operation::new("ABCD", "noop"), || {
                store.update_room("ABCD", RoomUpdate::new())
            })
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(300));
        assert!(executor.registry().pending_for("ABCD").is_empty());
        assert!(executor.registry().last_success("ABCD").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_operation_stays_registered() {
        let store = store_with_room().await;
        store.set_offline(true);
        let executor = executor();

        let err = executor
            .execute(Operation::new("ABCD", "noop"), || {
                store.update_room("ABCD", RoomUpdate::new())
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let pending = executor.registry().pending_for("ABCD");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 3);
        assert!(pending[0].exhausted);

        assert_eq!(executor.registry().clear_exhausted("ABCD"), 1);
        assert!(executor.registry().pending_for("ABCD").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let executor = executor();

        let err = executor
            .execute(Operation::new("ABCD", "missing"), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(StorageError::RoomNotFound {
                        room_id: "ABCD".into(),
                    })
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::RoomNotFound { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(executor.registry().pending_for("ABCD").is_empty());
    }
}
