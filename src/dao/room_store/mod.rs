#[cfg(feature = "couch-store")]
/// CouchDB-backed store.
pub mod couchdb;
mod feed;
pub mod memory;

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::broadcast;

use crate::dao::{models::RoomEntity, patch::RoomUpdate, storage::StorageResult};

pub use self::feed::ChangeFeed;

/// Snapshot delivered by the change feed after every committed mutation.
#[derive(Debug, Clone)]
pub struct RoomChange {
    /// Room the snapshot belongs to.
    pub room_id: String,
    /// Monotonic per-room revision of the committed document.
    pub revision: u64,
    /// Full record after the mutation; `None` once the room has been deleted.
    pub room: Option<Arc<RoomEntity>>,
}

/// Receiving half of a change feed. Dropping it unsubscribes.
pub type RoomFeed = broadcast::Receiver<RoomChange>;

/// Abstraction over the replicated document service holding room records.
pub trait RoomStore: Send + Sync {
    /// Insert a brand-new room, failing if the identifier is taken.
    fn create_room(&self, room_id: &str, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Read the current record, `None` when the room does not exist.
    fn fetch_room(&self, room_id: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Apply an atomic batch and return the committed record.
    fn update_room(
        &self,
        room_id: &str,
        update: RoomUpdate,
    ) -> BoxFuture<'static, StorageResult<RoomEntity>>;
    /// Remove a room. Returns whether it existed.
    fn delete_room(&self, room_id: &str) -> BoxFuture<'static, StorageResult<bool>>;
    /// Identifiers of every stored room.
    fn list_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<String>>>;
    /// Subscribe to snapshots of a single room.
    fn observe(&self, room_id: &str) -> RoomFeed;
    /// Subscribe to snapshots of every room.
    fn mutations(&self) -> RoomFeed;
    /// Cheap round trip proving the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
