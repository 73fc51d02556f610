// =============================================================================
// Slidesync Matrix Sliding Sync Server - Sortable Rooms Module
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   The ordered sequence of per-connection room records backing each tracked
//   list, with a comparator built from the request's sort keys and a reverse
//   index from room ID to absolute position.
//
// =============================================================================

use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::HashSet;

use ruma::{OwnedRoomId, RoomId};
use serde::{Deserialize, Serialize};

use crate::cache::{calculate_room_name, RoomMetadata, UserRoomData};

/// Comparator names accepted in a request's `sort` field. Earlier keys
/// dominate; ties after the full key sequence break on ascending room ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Ascending lexicographic over the canonicalised name
    ByName,

    /// Descending over the last message timestamp
    ByRecency,

    /// Descending over the unread notification count
    ByNotificationCount,

    /// Descending over the unread highlight count
    ByHighlightCount,
}

/// Characters stripped from calculated names before sorting so `#matrix`
/// and `matrix` collate together.
const NAME_TRIM_SET: &[char] = &['#', '!', '(', ')', ':', '_'];

/// A room as one connection sees it: the immutable metadata snapshot from
/// the global cache plus the connection-local overlay the comparators and
/// filters read.
#[derive(Debug, Clone)]
pub struct RoomConnMetadata {
    /// Snapshot from the global cache, heroes already stripped of the viewer
    pub metadata: RoomMetadata,

    /// Lowercased calculated name with leading symbols stripped
    pub canonicalised_name: String,

    /// Timestamp overlay, bumped as events arrive on this connection
    pub last_message_timestamp: u64,

    /// Unread highlight count for this user
    pub highlight_count: i64,

    /// Unread notification count for this user
    pub notification_count: i64,

    /// Whether this room is a DM for this user
    pub is_dm: bool,

    /// Whether this user is invited rather than joined
    pub is_invite: bool,

    /// Spaces this room belongs to, from the user's perspective
    pub spaces: HashSet<String>,

    /// The user's tags on this room
    pub tags: HashSet<String>,
}

impl RoomConnMetadata {
    /// Build a connection-local record from a cache snapshot and the user's
    /// room data.
    pub fn new(metadata: RoomMetadata, user_data: &UserRoomData) -> Self {
        let canonicalised_name = calculate_room_name(&metadata, 5)
            .to_lowercase()
            .trim_matches(NAME_TRIM_SET)
            .to_string();
        let last_message_timestamp = metadata.last_message_timestamp;
        Self {
            metadata,
            canonicalised_name,
            last_message_timestamp,
            highlight_count: user_data.highlight_count,
            notification_count: user_data.notification_count,
            is_dm: user_data.is_dm,
            is_invite: user_data.is_invite,
            spaces: user_data.spaces.clone(),
            tags: user_data.tags.clone(),
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.metadata.room_id
    }
}

/// An ordered room list with a reverse index kept consistent on every
/// mutation.
#[derive(Debug, Clone, Default)]
pub struct SortableRooms {
    rooms: Vec<RoomConnMetadata>,
    positions: HashMap<OwnedRoomId, usize>,
}

impl SortableRooms {
    pub fn new(rooms: Vec<RoomConnMetadata>) -> Self {
        let mut list = Self {
            rooms,
            positions: HashMap::new(),
        };
        list.reindex();
        list
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RoomConnMetadata> {
        self.rooms.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut RoomConnMetadata> {
        self.rooms.get_mut(index)
    }

    pub fn as_slice(&self) -> &[RoomConnMetadata] {
        &self.rooms
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RoomConnMetadata> {
        self.rooms.iter()
    }

    /// Position of a room in the list, from the reverse index.
    pub fn index_of(&self, room_id: &RoomId) -> Option<usize> {
        self.positions.get(room_id).copied()
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.positions.contains_key(room_id)
    }

    /// Append a newly observed room at the end of the list. The caller is
    /// expected to re-sort afterwards.
    pub fn push(&mut self, room: RoomConnMetadata) {
        self.positions
            .insert(room.room_id().to_owned(), self.rooms.len());
        self.rooms.push(room);
    }

    /// Stable sort by the given key sequence, then rebuild the reverse index.
    pub fn sort(&mut self, keys: &[SortKey]) {
        self.rooms.sort_by(|a, b| compare_rooms(a, b, keys));
        self.reindex();
    }

    fn reindex(&mut self) {
        self.positions.clear();
        for (i, room) in self.rooms.iter().enumerate() {
            self.positions.insert(room.room_id().to_owned(), i);
        }
    }
}

fn compare_rooms(a: &RoomConnMetadata, b: &RoomConnMetadata, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ord = match key {
            SortKey::ByName => a.canonicalised_name.cmp(&b.canonicalised_name),
            SortKey::ByRecency => b.last_message_timestamp.cmp(&a.last_message_timestamp),
            SortKey::ByNotificationCount => b.notification_count.cmp(&a.notification_count),
            SortKey::ByHighlightCount => b.highlight_count.cmp(&a.highlight_count),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.room_id().cmp(b.room_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruma::RoomId;

    fn room(id: &str, name: &str, ts: u64, notifs: i64, highlights: i64) -> RoomConnMetadata {
        let mut metadata = RoomMetadata::new(RoomId::parse(id).unwrap());
        metadata.name = Some(name.to_string());
        metadata.last_message_timestamp = ts;
        let user_data = UserRoomData {
            notification_count: notifs,
            highlight_count: highlights,
            ..Default::default()
        };
        RoomConnMetadata::new(metadata, &user_data)
    }

    #[test]
    fn test_sort_key_wire_names() {
        assert_eq!(
            serde_json::to_string(&SortKey::ByRecency).unwrap(),
            "\"by_recency\""
        );
        let keys: Vec<SortKey> =
            serde_json::from_str(r#"["by_name","by_notification_count","by_highlight_count"]"#)
                .unwrap();
        assert_eq!(
            keys,
            vec![
                SortKey::ByName,
                SortKey::ByNotificationCount,
                SortKey::ByHighlightCount
            ]
        );
        assert!(serde_json::from_str::<SortKey>("\"by_magic\"").is_err());
    }

    #[test]
    fn test_canonicalised_name_strips_symbols() {
        let r = room("!a:localhost", "#Matrix_HQ", 0, 0, 0);
        assert_eq!(r.canonicalised_name, "matrix_hq");
        let r = room("!a:localhost", "(The) Lobby:", 0, 0, 0);
        assert_eq!(r.canonicalised_name, "the) lobby");
    }

    #[test]
    fn test_sort_by_recency() {
        let mut list = SortableRooms::new(vec![
            room("!a:localhost", "a", 10, 0, 0),
            room("!b:localhost", "b", 30, 0, 0),
            room("!c:localhost", "c", 20, 0, 0),
        ]);
        list.sort(&[SortKey::ByRecency]);
        let ids: Vec<&str> = list.iter().map(|r| r.room_id().as_str()).collect();
        assert_eq!(ids, vec!["!b:localhost", "!c:localhost", "!a:localhost"]);
    }

    #[test]
    fn test_sort_by_name_then_counts() {
        let mut list = SortableRooms::new(vec![
            room("!a:localhost", "zebra", 0, 5, 0),
            room("!b:localhost", "apple", 0, 1, 0),
            room("!c:localhost", "apple", 0, 9, 0),
        ]);
        list.sort(&[SortKey::ByName, SortKey::ByNotificationCount]);
        let ids: Vec<&str> = list.iter().map(|r| r.room_id().as_str()).collect();
        // apple rooms first, higher notification count wins the tie
        assert_eq!(ids, vec!["!c:localhost", "!b:localhost", "!a:localhost"]);
    }

    #[test]
    fn test_tiebreak_is_room_id() {
        let mut list = SortableRooms::new(vec![
            room("!b:localhost", "same", 7, 0, 0),
            room("!a:localhost", "same", 7, 0, 0),
        ]);
        list.sort(&[SortKey::ByRecency]);
        let ids: Vec<&str> = list.iter().map(|r| r.room_id().as_str()).collect();
        assert_eq!(ids, vec!["!a:localhost", "!b:localhost"]);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let mut list = SortableRooms::new(vec![
            room("!a:localhost", "a", 10, 2, 1),
            room("!b:localhost", "b", 30, 0, 4),
            room("!c:localhost", "c", 20, 7, 0),
            room("!d:localhost", "d", 20, 7, 0),
        ]);
        let keys = [SortKey::ByNotificationCount, SortKey::ByRecency];
        list.sort(&keys);
        let first: Vec<String> = list.iter().map(|r| r.room_id().to_string()).collect();
        list.sort(&keys);
        let second: Vec<String> = list.iter().map(|r| r.room_id().to_string()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reverse_index_consistency() {
        let mut list = SortableRooms::new(vec![
            room("!a:localhost", "a", 10, 0, 0),
            room("!b:localhost", "b", 30, 0, 0),
        ]);
        list.sort(&[SortKey::ByRecency]);
        list.push(room("!c:localhost", "c", 99, 0, 0));
        list.sort(&[SortKey::ByRecency]);
        for i in 0..list.len() {
            let r = list.get(i).unwrap();
            assert_eq!(list.index_of(r.room_id()), Some(i));
        }
        assert_eq!(list.index_of(&RoomId::parse("!zz:localhost").unwrap()), None);
    }
}
