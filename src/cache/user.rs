// =============================================================================
// Slidesync Matrix Sliding Sync Server - User Cache Module
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Per-user room data (timelines, unread counts, tags, spaces) plus the
//   listener registry connections use to hear about new events. Listeners
//   are held weakly: the cache can deliver callbacks but never owns a
//   connection's lifetime.
//
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use ruma::{OwnedRoomId, OwnedUserId, RoomId, UserId};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::global::GlobalCache;
use super::types::{EventData, UserRoomData};

/// Callbacks fired on poller threads when a user's data changes. The only
/// legal cross-thread interaction with connection state: implementations
/// funnel these into the connection inbox.
#[async_trait]
pub trait UserCacheListener: Send + Sync {
    /// A new event arrived for a room this user can see.
    async fn on_new_event(&self, event: &EventData);

    /// The user's unread counts changed for a room.
    async fn on_unread_counts_changed(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        data: UserRoomData,
        has_count_decreased: bool,
    );
}

/// Per-user slice of the upstream state
pub struct UserCache {
    /// The user this cache belongs to
    user_id: OwnedUserId,

    /// Room data keyed by room
    rooms: RwLock<HashMap<OwnedRoomId, UserRoomData>>,

    /// Registered listeners, held weakly
    listeners: RwLock<HashMap<u64, Weak<dyn UserCacheListener>>>,

    next_listener_id: AtomicU64,

    global: Arc<GlobalCache>,
}

impl UserCache {
    pub fn new(user_id: OwnedUserId, global: Arc<GlobalCache>) -> Arc<Self> {
        Arc::new(Self {
            user_id,
            rooms: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
            next_listener_id: AtomicU64::new(0),
            global,
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Register a listener, returning the subscription ID to unsubscribe
    /// with.
    pub async fn subscribe(&self, listener: &Arc<dyn UserCacheListener>) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .write()
            .await
            .insert(id, Arc::downgrade(listener));
        debug!(user_id = %self.user_id, id, "👂 listener subscribed");
        id
    }

    /// Remove a listener. Idempotent.
    pub async fn unsubscribe(&self, id: u64) {
        self.listeners.write().await.remove(&id);
        debug!(user_id = %self.user_id, id, "🔇 listener unsubscribed");
    }

    /// Room data for a set of rooms with timelines truncated to the last
    /// `timeline_limit` events, oldest first. Unknown rooms come back with
    /// empty data rather than an error.
    #[instrument(level = "debug", skip(self, room_ids))]
    pub async fn lazily_load_room_datas(
        &self,
        _load_position: i64,
        room_ids: &[OwnedRoomId],
        timeline_limit: usize,
    ) -> HashMap<OwnedRoomId, UserRoomData> {
        let rooms = self.rooms.read().await;
        room_ids
            .iter()
            .map(|room_id| {
                let mut data = rooms.get(room_id).cloned().unwrap_or_default();
                if data.timeline.len() > timeline_limit {
                    data.timeline = data
                        .timeline
                        .split_off(data.timeline.len() - timeline_limit);
                }
                (room_id.clone(), data)
            })
            .collect()
    }

    /// Current data for a single room.
    pub async fn load_room_data(&self, room_id: &RoomId) -> UserRoomData {
        self.rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    // ========== Poller-facing writes ==========

    /// Seed or replace the data for a room.
    pub async fn set_room_data(&self, room_id: OwnedRoomId, data: UserRoomData) {
        self.rooms.write().await.insert(room_id, data);
    }

    /// Absorb a new timeline event and fan it out to listeners.
    pub async fn on_new_event(&self, event: EventData) {
        if let Some(ev) = &event.event {
            let mut rooms = self.rooms.write().await;
            let data = rooms.entry(event.room_id.clone()).or_default();
            data.timeline.push(ev.clone());
        }
        let listeners = self.live_listeners().await;
        for listener in listeners {
            listener.on_new_event(&event).await;
        }
    }

    /// Record changed unread counts and fan the change out to listeners.
    pub async fn on_unread_counts_changed(
        &self,
        room_id: &RoomId,
        notification_count: i64,
        highlight_count: i64,
    ) {
        let (data, has_count_decreased) = {
            let mut rooms = self.rooms.write().await;
            let data = rooms.entry(room_id.to_owned()).or_default();
            let has_count_decreased = notification_count < data.notification_count
                || highlight_count < data.highlight_count;
            data.notification_count = notification_count;
            data.highlight_count = highlight_count;
            (data.clone(), has_count_decreased)
        };
        let listeners = self.live_listeners().await;
        for listener in listeners {
            listener
                .on_unread_counts_changed(&self.user_id, room_id, data.clone(), has_count_decreased)
                .await;
        }
    }

    /// Upgrade live listeners, pruning the ones whose connections are gone.
    async fn live_listeners(&self) -> Vec<Arc<dyn UserCacheListener>> {
        let mut listeners = self.listeners.write().await;
        let mut live = Vec::with_capacity(listeners.len());
        listeners.retain(|_, weak| match weak.upgrade() {
            Some(listener) => {
                live.push(listener);
                true
            }
            None => false,
        });
        live
    }

    /// The global cache backing this user's view.
    pub fn global(&self) -> &Arc<GlobalCache> {
        &self.global
    }
}

impl std::fmt::Debug for UserCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCache")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingListener {
        events: Mutex<Vec<EventData>>,
        count_changes: Mutex<Vec<(OwnedRoomId, bool)>>,
    }

    impl RecordingListener {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
                count_changes: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl UserCacheListener for RecordingListener {
        async fn on_new_event(&self, event: &EventData) {
            self.events.lock().unwrap().push(event.clone());
        }

        async fn on_unread_counts_changed(
            &self,
            _user_id: &UserId,
            room_id: &RoomId,
            _data: UserRoomData,
            has_count_decreased: bool,
        ) {
            self.count_changes
                .lock()
                .unwrap()
                .push((room_id.to_owned(), has_count_decreased));
        }
    }

    fn room_id(s: &str) -> OwnedRoomId {
        RoomId::parse(s).unwrap()
    }

    fn new_cache() -> Arc<UserCache> {
        UserCache::new(
            UserId::parse("@alice:localhost").unwrap(),
            GlobalCache::new(),
        )
    }

    #[tokio::test]
    async fn test_timeline_truncation() {
        let cache = new_cache();
        let id = room_id("!r:localhost");
        let data = UserRoomData {
            timeline: (0..10).map(|i| serde_json::json!({"i": i})).collect(),
            ..Default::default()
        };
        cache.set_room_data(id.clone(), data).await;

        let datas = cache
            .lazily_load_room_datas(0, std::slice::from_ref(&id), 3)
            .await;
        let timeline = &datas[&id].timeline;
        assert_eq!(timeline.len(), 3);
        // the last events survive, oldest first
        assert_eq!(timeline[0]["i"], 7);
        assert_eq!(timeline[2]["i"], 9);
    }

    #[tokio::test]
    async fn test_fan_out_and_weak_pruning() {
        let cache = new_cache();
        let listener = RecordingListener::new();
        let as_dyn: Arc<dyn UserCacheListener> = listener.clone();
        let id = cache.subscribe(&as_dyn).await;

        let ev = EventData::new(
            room_id("!r:localhost"),
            serde_json::json!({"type": "m.room.message"}),
            1,
            1,
        );
        cache.on_new_event(ev.clone()).await;
        assert_eq!(listener.events.lock().unwrap().len(), 1);

        // dropping the listener prunes it on the next dispatch
        drop(as_dyn);
        drop(listener);
        cache.on_new_event(ev).await;
        assert!(cache.listeners.read().await.is_empty());

        // unsubscribing an already-pruned id is fine
        cache.unsubscribe(id).await;
    }

    #[tokio::test]
    async fn test_unread_counts_decrease_detection() {
        let cache = new_cache();
        let listener = RecordingListener::new();
        let as_dyn: Arc<dyn UserCacheListener> = listener.clone();
        cache.subscribe(&as_dyn).await;

        let id = room_id("!r:localhost");
        cache.on_unread_counts_changed(&id, 5, 1).await;
        cache.on_unread_counts_changed(&id, 2, 1).await;
        let changes = listener.count_changes.lock().unwrap();
        assert_eq!(changes.len(), 2);
        assert!(!changes[0].1, "an increase is not a decrease");
        assert!(changes[1].1);
    }
}
