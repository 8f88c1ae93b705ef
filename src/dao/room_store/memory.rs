//! In-process replicated document store. Used when no external database is configured and
//! throughout the test suite; supports simulated outages.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use serde_json::Value;

use crate::dao::{
    models::RoomEntity,
    patch::{RoomUpdate, apply_update},
    storage::{StorageError, StorageResult},
};

use super::{ChangeFeed, RoomChange, RoomFeed, RoomStore};

const FEED_CAPACITY: usize = 64;

struct StoredDocument {
    revision: u64,
    body: Value,
}

struct Inner {
    documents: DashMap<String, StoredDocument>,
    feed: ChangeFeed,
    offline: AtomicBool,
    failures_to_inject: AtomicU32,
}

/// Room store keeping every document in memory.
#[derive(Clone)]
pub struct MemoryRoomStore {
    inner: Arc<Inner>,
}

impl Default for MemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRoomStore {
    /// Empty, online store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                documents: DashMap::new(),
                feed: ChangeFeed::new(FEED_CAPACITY),
                offline: AtomicBool::new(false),
                failures_to_inject: AtomicU32::new(0),
            }),
        }
    }

    /// Simulate a full outage: every call fails with a retryable error until cleared.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next `count` mutating calls fail with a retryable error.
    pub fn inject_failures(&self, count: u32) {
        self.inner.failures_to_inject.store(count, Ordering::SeqCst);
    }

    fn ensure_online(&self, operation: &str) -> StorageResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                format!("memory store offline during {operation}"),
                io::Error::new(io::ErrorKind::NotConnected, "simulated outage"),
            ));
        }
        Ok(())
    }

    fn ensure_writable(&self, operation: &str) -> StorageResult<()> {
        self.ensure_online(operation)?;
        let injected = self.inner.failures_to_inject.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |remaining| remaining.checked_sub(1),
        );
        if injected.is_ok() {
            return Err(StorageError::unavailable(
                format!("injected failure during {operation}"),
                io::Error::new(io::ErrorKind::TimedOut, "simulated transient failure"),
            ));
        }
        Ok(())
    }

    fn create(&self, room_id: &str, room: RoomEntity) -> StorageResult<()> {
        self.ensure_writable("create")?;
        let body = serde_json::to_value(&room).map_err(|source| StorageError::Corrupt {
            room_id: room_id.to_owned(),
            source,
        })?;
        match self.inner.documents.entry(room_id.to_owned()) {
            Entry::Occupied(_) => Err(StorageError::RoomExists {
                room_id: room_id.to_owned(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(StoredDocument { revision: 1, body });
                self.inner.feed.publish(RoomChange {
                    room_id: room_id.to_owned(),
                    revision: 1,
                    room: Some(Arc::new(room)),
                });
                Ok(())
            }
        }
    }

    fn fetch(&self, room_id: &str) -> StorageResult<Option<RoomEntity>> {
        self.ensure_online("fetch")?;
        let Some(document) = self.inner.documents.get(room_id) else {
            return Ok(None);
        };
        decode(room_id, document.body.clone()).map(Some)
    }

    fn update(&self, room_id: &str, update: &RoomUpdate) -> StorageResult<RoomEntity> {
        self.ensure_writable("update")?;
        let mut document =
            self.inner
                .documents
                .get_mut(room_id)
                .ok_or_else(|| StorageError::RoomNotFound {
                    room_id: room_id.to_owned(),
                })?;

        let mut body = document.body.clone();
        apply_update(&mut body, update).map_err(|err| err.into_storage_error(room_id))?;
        let room = decode(room_id, body.clone())?;

        document.body = body;
        document.revision += 1;
        // Publish while the entry is still locked so subscribers see revisions in order.
        self.inner.feed.publish(RoomChange {
            room_id: room_id.to_owned(),
            revision: document.revision,
            room: Some(Arc::new(room.clone())),
        });
        Ok(room)
    }

    fn delete(&self, room_id: &str) -> StorageResult<bool> {
        self.ensure_writable("delete")?;
        let Some((_, document)) = self.inner.documents.remove(room_id) else {
            return Ok(false);
        };
        self.inner.feed.publish(RoomChange {
            room_id: room_id.to_owned(),
            revision: document.revision + 1,
            room: None,
        });
        Ok(true)
    }
}

fn decode(room_id: &str, body: Value) -> StorageResult<RoomEntity> {
    serde_json::from_value(body).map_err(|source| StorageError::Corrupt {
        room_id: room_id.to_owned(),
        source,
    })
}

impl RoomStore for MemoryRoomStore {
    fn create_room(&self, room_id: &str, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.create(room_id, room);
        Box::pin(async move { result })
    }

    fn fetch_room(&self, room_id: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let result = self.fetch(room_id);
        Box::pin(async move { result })
    }

    fn update_room(
        &self,
        room_id: &str,
        update: RoomUpdate,
    ) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        let result = self.update(room_id, &update);
        Box::pin(async move { result })
    }

    fn delete_room(&self, room_id: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let result = self.delete(room_id);
        Box::pin(async move { result })
    }

    fn list_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let result: StorageResult<Vec<String>> = self.ensure_online("list").map(|()| {
            self.inner
                .documents
                .iter()
                .map(|entry| entry.key().clone())
                .collect()
        });
        Box::pin(async move { result })
    }

    fn observe(&self, room_id: &str) -> RoomFeed {
        self.inner.feed.subscribe(room_id)
    }

    fn mutations(&self) -> RoomFeed {
        self.inner.feed.subscribe_all()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.ensure_online("health check");
        Box::pin(async move { result })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.health_check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{models::RoomStatus, patch::FieldPath};

    fn room() -> RoomEntity {
        RoomEntity {
            host: "alice".into(),
            ..RoomEntity::default()
        }
    }

    #[tokio::test]
    async fn update_publishes_snapshot_to_room_and_global_feeds() {
        let store = MemoryRoomStore::new();
        store.create_room("ABCD", room()).await.unwrap();

        let mut room_feed = store.observe("ABCD");
        let mut global_feed = store.mutations();

        let committed = store
            .update_room(
                "ABCD",
                RoomUpdate::new().set(FieldPath::root("status"), "game"),
            )
            .await
            .unwrap();
        assert_eq!(committed.status, RoomStatus::Game);

        let change = room_feed.recv().await.unwrap();
        assert_eq!(change.revision, 2);
        assert_eq!(change.room.unwrap().status, RoomStatus::Game);
        assert_eq!(global_feed.recv().await.unwrap().room_id, "ABCD");
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = MemoryRoomStore::new();
        store.create_room("ABCD", room()).await.unwrap();
        let err = store.create_room("ABCD", room()).await.unwrap_err();
        assert!(matches!(err, StorageError::RoomExists { .. }));
    }

    #[tokio::test]
    async fn patch_producing_invalid_record_is_not_committed() {
        let store = MemoryRoomStore::new();
        store.create_room("ABCD", room()).await.unwrap();

        let err = store
            .update_room(
                "ABCD",
                RoomUpdate::new().set(FieldPath::root("status"), "paused"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));

        let stored = store.fetch_room("ABCD").await.unwrap().unwrap();
        assert_eq!(stored.status, RoomStatus::Lobby);
    }

    #[tokio::test]
    async fn deletion_closes_room_feed() {
        let store = MemoryRoomStore::new();
        store.create_room("ABCD", room()).await.unwrap();
        let mut feed = store.observe("ABCD");

        assert!(store.delete_room("ABCD").await.unwrap());
        assert!(feed.recv().await.unwrap().room.is_none());
        assert!(store.fetch_room("ABCD").await.unwrap().is_none());
        assert!(!store.delete_room("ABCD").await.unwrap());
    }

    #[tokio::test]
    async fn offline_and_injected_failures_are_retryable() {
        let store = MemoryRoomStore::new();
        store.create_room("ABCD", room()).await.unwrap();

        store.inject_failures(1);
        let err = store
            .update_room("ABCD", RoomUpdate::new())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        store.update_room("ABCD", RoomUpdate::new()).await.unwrap();

        store.set_offline(true);
        assert!(store.health_check().await.unwrap_err().is_retryable());
        store.set_offline(false);
        store.health_check().await.unwrap();
    }
}
