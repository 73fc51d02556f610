// =============================================================================
// Slidesync Matrix Sliding Sync Server - Cache Types Module
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Shared data types flowing between the caches and the per-connection
//   engine: room metadata snapshots, per-user room data and the event
//   payloads fanned out to connection inboxes.
//
// =============================================================================

use std::collections::HashSet;

use ruma::{OwnedRoomId, OwnedUserId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A member shown in the room name when the room has no explicit name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hero {
    /// User ID of the hero
    pub user_id: OwnedUserId,

    /// Display name, if set
    pub display_name: Option<String>,
}

/// Immutable server-wide room metadata snapshot. Connections never mutate
/// these; per-connection overlays carry the mutable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMetadata {
    /// Room ID
    pub room_id: OwnedRoomId,

    /// `m.room.name` content, if any
    pub name: Option<String>,

    /// Canonical alias, if any
    pub canonical_alias: Option<String>,

    /// Members used for name calculation when the room is unnamed
    pub heroes: Vec<Hero>,

    /// Origin server timestamp of the most recent timeline event, in millis
    pub last_message_timestamp: u64,

    /// Whether the room is encrypted
    pub encrypted: bool,

    /// Whether the room has been tombstoned
    pub tombstoned: bool,

    /// Room type from `m.room.create`, if any
    pub room_type: Option<String>,

    /// Joined member count
    pub joined_count: u64,

    /// Invited member count
    pub invited_count: u64,
}

impl RoomMetadata {
    pub fn new(room_id: OwnedRoomId) -> Self {
        Self {
            room_id,
            name: None,
            canonical_alias: None,
            heroes: Vec::new(),
            last_message_timestamp: 0,
            encrypted: false,
            tombstoned: false,
            room_type: None,
            joined_count: 0,
            invited_count: 0,
        }
    }

    /// Drop the viewing user from the hero list so they never see themselves
    /// in a calculated room name.
    pub fn remove_hero(&mut self, user_id: &UserId) {
        self.heroes.retain(|h| h.user_id != user_id);
    }
}

/// Calculate a display name for the room: explicit name, then canonical
/// alias, then up to `max_heroes` member names, then the room ID.
pub fn calculate_room_name(metadata: &RoomMetadata, max_heroes: usize) -> String {
    if let Some(name) = &metadata.name {
        if !name.is_empty() {
            return name.clone();
        }
    }
    if let Some(alias) = &metadata.canonical_alias {
        if !alias.is_empty() {
            return alias.clone();
        }
    }
    if !metadata.heroes.is_empty() {
        let names: Vec<String> = metadata
            .heroes
            .iter()
            .take(max_heroes)
            .map(|h| {
                h.display_name
                    .clone()
                    .unwrap_or_else(|| h.user_id.to_string())
            })
            .collect();
        let mut name = names.join(", ");
        let extra = metadata.heroes.len().saturating_sub(max_heroes);
        if extra > 0 {
            name.push_str(&format!(" and {} others", extra));
        }
        return name;
    }
    metadata.room_id.to_string()
}

/// Per-user data for a single room as maintained by the user cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRoomData {
    /// Most recent timeline events, oldest first
    pub timeline: Vec<Value>,

    /// Unread notification count
    pub notification_count: i64,

    /// Unread highlight count
    pub highlight_count: i64,

    /// Whether this room is a direct message for the user
    pub is_dm: bool,

    /// Whether the user is invited rather than joined
    pub is_invite: bool,

    /// Space rooms this room is a child of
    pub spaces: HashSet<String>,

    /// Tags the user has applied to the room
    pub tags: HashSet<String>,

    /// Pagination token for fetching earlier timeline events
    pub prev_batch: Option<String>,
}

/// An update pushed from the upstream poller to connection inboxes
#[derive(Debug, Clone)]
pub struct EventData {
    /// Room the update is about
    pub room_id: OwnedRoomId,

    /// Event type, e.g. `m.room.message`
    pub event_type: String,

    /// State key for state events
    pub state_key: Option<String>,

    /// The raw event, absent for synthetic updates such as unread count
    /// changes
    pub event: Option<Value>,

    /// Origin server timestamp in millis
    pub timestamp: u64,

    /// The upstream position this event was committed at. Zero means the
    /// position is unknown (synthetic updates).
    pub latest_pos: i64,

    /// Updated per-user data, set on unread count changes
    pub user_room_data: Option<UserRoomData>,
}

impl EventData {
    pub fn new(room_id: OwnedRoomId, event: Value, timestamp: u64, latest_pos: i64) -> Self {
        let event_type = event
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let state_key = event
            .get("state_key")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        Self {
            room_id,
            event_type,
            state_key,
            event: Some(event),
            timestamp,
            latest_pos,
            user_room_data: None,
        }
    }
}
