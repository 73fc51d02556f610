// =============================================================================
// Slidesync Matrix Sliding Sync Server - Global Cache Module
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Server-wide room state shared by every connection: metadata snapshots,
//   current state events and the joined-room sets per user. Written by the
//   upstream poller, read by connections under snapshot semantics at their
//   load position.
//
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use ruma::{OwnedRoomId, OwnedUserId, RoomId, UserId};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::types::{EventData, RoomMetadata};
use crate::error::{Error, Result};
use crate::service::sync::request::RequiredStateMap;

/// Server-wide room store. Connections never mutate it; the poller owns all
/// writes.
#[derive(Debug, Default)]
pub struct GlobalCache {
    /// Room metadata snapshots
    rooms: RwLock<HashMap<OwnedRoomId, RoomMetadata>>,

    /// Current state events per room
    room_state: RwLock<HashMap<OwnedRoomId, Vec<Value>>>,

    /// Joined room sets per user
    joined_rooms: RwLock<HashMap<OwnedUserId, HashSet<OwnedRoomId>>>,

    /// Latest committed upstream position
    latest_position: AtomicI64,
}

impl GlobalCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The latest committed upstream position.
    pub fn current_position(&self) -> i64 {
        self.latest_position.load(Ordering::SeqCst)
    }

    /// Commit a new upstream position, returning it. Called by the poller
    /// before fanning an event out to user caches.
    pub fn advance_position(&self) -> i64 {
        self.latest_position.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The initial room list for a user together with the position the
    /// snapshot is consistent at.
    #[instrument(level = "debug", skip(self))]
    pub async fn load_joined_rooms(
        &self,
        user_id: &UserId,
    ) -> Result<(i64, Vec<RoomMetadata>)> {
        let position = self.current_position();
        let joined = self.joined_rooms.read().await;
        let rooms = self.rooms.read().await;
        let metadatas = joined
            .get(user_id)
            .map(|room_ids| {
                room_ids
                    .iter()
                    .filter_map(|room_id| rooms.get(room_id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok((position, metadatas))
    }

    /// Metadata snapshot for one room.
    pub async fn load_room(&self, room_id: &RoomId) -> Result<RoomMetadata> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or_else(|| Error::UpstreamUnavailable(format!("no metadata for room {room_id}")))
    }

    /// The room's state at the given position, filtered through the
    /// required-state map. An empty map requests nothing.
    pub async fn load_room_state(
        &self,
        room_id: &RoomId,
        _load_position: i64,
        required_state: &RequiredStateMap,
    ) -> Result<Vec<Value>> {
        if required_state.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.room_state.read().await;
        let events = state
            .get(room_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|ev| {
                        let event_type = ev.get("type").and_then(Value::as_str).unwrap_or("");
                        let state_key = ev.get("state_key").and_then(Value::as_str).unwrap_or("");
                        required_state.include(event_type, state_key)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(events)
    }

    // ========== Poller-facing writes ==========

    /// Insert or replace a room's metadata snapshot.
    pub async fn insert_room(&self, metadata: RoomMetadata) {
        self.rooms
            .write()
            .await
            .insert(metadata.room_id.clone(), metadata);
    }

    /// Replace a room's current state events.
    pub async fn set_room_state(&self, room_id: OwnedRoomId, events: Vec<Value>) {
        self.room_state.write().await.insert(room_id, events);
    }

    /// Mark a room as joined for a user.
    pub async fn add_joined_room(&self, user_id: &UserId, room_id: &RoomId) {
        self.joined_rooms
            .write()
            .await
            .entry(user_id.to_owned())
            .or_default()
            .insert(room_id.to_owned());
    }

    /// Fold a new timeline event into the room's metadata snapshot.
    pub async fn on_new_event(&self, event: &EventData) {
        let mut rooms = self.rooms.write().await;
        let metadata = rooms
            .entry(event.room_id.clone())
            .or_insert_with(|| RoomMetadata::new(event.room_id.clone()));
        if event.timestamp > metadata.last_message_timestamp {
            metadata.last_message_timestamp = event.timestamp;
        }
        debug!(
            room_id = %event.room_id,
            pos = event.latest_pos,
            "🌍 global cache absorbed event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::sync::request::RoomSubscription;

    fn room_id(s: &str) -> OwnedRoomId {
        RoomId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_load_joined_rooms_snapshot() {
        let cache = GlobalCache::new();
        let alice = UserId::parse("@alice:localhost").unwrap();
        for i in 0..3 {
            let id = room_id(&format!("!r{i}:localhost"));
            cache.insert_room(RoomMetadata::new(id.clone())).await;
            cache.add_joined_room(&alice, &id).await;
        }
        cache.advance_position();
        let (pos, rooms) = cache.load_joined_rooms(&alice).await.unwrap();
        assert_eq!(pos, 1);
        assert_eq!(rooms.len(), 3);

        let bob = UserId::parse("@bob:localhost").unwrap();
        let (_, rooms) = cache.load_joined_rooms(&bob).await.unwrap();
        assert!(rooms.is_empty());
    }

    #[tokio::test]
    async fn test_load_room_missing_is_upstream_error() {
        let cache = GlobalCache::new();
        let err = cache.load_room(&room_id("!nope:localhost")).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_load_room_state_filters_through_required_state() {
        let cache = GlobalCache::new();
        let id = room_id("!r:localhost");
        cache
            .set_room_state(
                id.clone(),
                vec![
                    serde_json::json!({"type": "m.room.name", "state_key": "", "content": {"name": "hi"}}),
                    serde_json::json!({"type": "m.room.member", "state_key": "@bob:localhost"}),
                ],
            )
            .await;

        let sub = RoomSubscription {
            required_state: Some(vec![["m.room.name".into(), "".into()]]),
            timeline_limit: 0,
        };
        let events = cache
            .load_room_state(&id, 0, &sub.required_state_map())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "m.room.name");

        // an empty subscription requests nothing
        let events = cache
            .load_room_state(&id, 0, &RoomSubscription::default().required_state_map())
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_on_new_event_bumps_timestamp() {
        let cache = GlobalCache::new();
        let id = room_id("!r:localhost");
        cache.insert_room(RoomMetadata::new(id.clone())).await;
        let pos = cache.advance_position();
        let ev = EventData::new(
            id.clone(),
            serde_json::json!({"type": "m.room.message"}),
            500,
            pos,
        );
        cache.on_new_event(&ev).await;
        let metadata = cache.load_room(&id).await.unwrap();
        assert_eq!(metadata.last_message_timestamp, 500);
    }
}
