use dashmap::DashMap;
use tokio::sync::broadcast;

use super::{RoomChange, RoomFeed};

/// Fan-out of committed room snapshots, per room and globally.
pub struct ChangeFeed {
    global: broadcast::Sender<RoomChange>,
    rooms: DashMap<String, broadcast::Sender<RoomChange>>,
    capacity: usize,
}

impl ChangeFeed {
    /// Build a feed whose channels buffer `capacity` snapshots per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (global, _receiver) = broadcast::channel(capacity);
        Self {
            global,
            rooms: DashMap::new(),
            capacity,
        }
    }

    /// Register a subscriber for one room. Channels whose subscribers all left are dropped
    /// on the way.
    pub fn subscribe(&self, room_id: &str) -> RoomFeed {
        self.rooms.retain(|_, sender| sender.receiver_count() > 0);
        self.rooms
            .entry(room_id.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Register a subscriber for every room.
    pub fn subscribe_all(&self) -> RoomFeed {
        self.global.subscribe()
    }

    /// Deliver a snapshot to room and global subscribers, ignoring delivery errors.
    /// A deletion also retires the room channel so its subscribers observe the close.
    pub fn publish(&self, change: RoomChange) {
        let deleted = change.room.is_none();
        if let Some(sender) = self.rooms.get(&change.room_id) {
            let _ = sender.send(change.clone());
        }
        if deleted {
            self.rooms.remove(&change.room_id);
        } else {
            self.rooms
                .remove_if(&change.room_id, |_, sender| sender.receiver_count() == 0);
        }
        let _ = self.global.send(change);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dao::models::RoomEntity;

    fn change(room_id: &str) -> RoomChange {
        RoomChange {
            room_id: room_id.to_owned(),
            revision: 1,
            room: Some(Arc::new(RoomEntity::default())),
        }
    }

    #[test]
    fn abandoned_room_channels_are_dropped() {
        let feed = ChangeFeed::new(4);
        drop(feed.subscribe("GONE"));
        let _kept = feed.subscribe("ROOM");
        assert_eq!(feed.rooms.len(), 1);

        drop(feed.subscribe("IDLE"));
        feed.publish(change("IDLE"));
        assert!(!feed.rooms.contains_key("IDLE"));
        assert!(feed.rooms.contains_key("ROOM"));
    }

    #[tokio::test]
    async fn subscribers_receive_room_and_global_snapshots() {
        let feed = ChangeFeed::new(4);
        let mut room = feed.subscribe("ROOM");
        let mut all = feed.subscribe_all();
        feed.publish(change("OTHER"));
        feed.publish(change("ROOM"));

        assert_eq!(room.recv().await.unwrap().room_id, "ROOM");
        assert_eq!(all.recv().await.unwrap().room_id, "OTHER");
        assert_eq!(all.recv().await.unwrap().room_id, "ROOM");
    }
}
