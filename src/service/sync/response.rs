// =============================================================================
// Slidesync Matrix Sliding Sync Server - Response Module
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Wire types for sync responses: the per-list operation stream that
//   mutates the client's local array-of-rooms, and the room payloads
//   projected for subscriptions and window syncs.
//
// =============================================================================

use std::collections::HashMap;

use ruma::OwnedRoomId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A sync response at a new connection position
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    /// Opaque connection position to hand back as `since`
    pub next: String,

    /// Echo of the request's transaction ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txn_id: Option<String>,

    /// Per-list counts and operation streams, positionally matching the
    /// request's lists
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lists: Vec<ResponseList>,

    /// Room payloads for subscriptions resolved or updated by this response
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub rooms: HashMap<OwnedRoomId, Room>,

    /// Extension responses, opaque to the core
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub extensions: Value,
}

/// One list's slice of the response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseList {
    /// Total number of rooms in the list, not just the tracked windows
    pub count: u64,

    /// Operations to apply, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ops: Vec<ResponseOp>,
}

/// A single operation against the client's local room array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum ResponseOp {
    /// Replace the given window with these rooms
    #[serde(rename = "SYNC")]
    Sync {
        range: [u64; 2],
        room_ids: Vec<OwnedRoomId>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rooms: Vec<Room>,
    },

    /// Forget everything previously synced in the given window
    #[serde(rename = "INVALIDATE")]
    Invalidate { range: [u64; 2] },

    /// Insert a room at an absolute index, shifting later entries
    #[serde(rename = "INSERT")]
    Insert {
        index: u64,
        room_id: OwnedRoomId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<Room>,
    },

    /// Remove the entry at an absolute index, shifting later entries
    #[serde(rename = "DELETE")]
    Delete { index: u64 },

    /// Refresh the room already at an absolute index
    #[serde(rename = "UPDATE")]
    Update {
        index: u64,
        room_id: OwnedRoomId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<Room>,
    },
}

impl ResponseOp {
    /// The wire name of this operation
    pub fn op(&self) -> &'static str {
        match self {
            ResponseOp::Sync { .. } => "SYNC",
            ResponseOp::Invalidate { .. } => "INVALIDATE",
            ResponseOp::Insert { .. } => "INSERT",
            ResponseOp::Delete { .. } => "DELETE",
            ResponseOp::Update { .. } => "UPDATE",
        }
    }
}

/// A room as projected for the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: OwnedRoomId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// State events matching the subscription's required-state map
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_state: Vec<Value>,

    /// Most recent timeline events, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timeline: Vec<Value>,

    #[serde(default)]
    pub notification_count: i64,

    #[serde(default)]
    pub highlight_count: i64,

    /// True on the first projection of a room for this connection
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub initial: bool,

    #[serde(default, skip_serializing_if = "u64_is_zero")]
    pub joined_count: u64,

    #[serde(default, skip_serializing_if = "u64_is_zero")]
    pub invited_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_batch: Option<String>,
}

fn u64_is_zero(n: &u64) -> bool {
    *n == 0
}

impl Room {
    /// A payload carrying nothing but the identifier, used when the full
    /// projection is delivered elsewhere.
    pub fn stub(room_id: OwnedRoomId) -> Self {
        Self {
            room_id,
            name: None,
            required_state: Vec::new(),
            timeline: Vec::new(),
            notification_count: 0,
            highlight_count: 0,
            initial: false,
            joined_count: 0,
            invited_count: 0,
            prev_batch: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruma::RoomId;

    fn room_id() -> OwnedRoomId {
        RoomId::parse("!foo:localhost").unwrap()
    }

    #[test]
    fn test_op_tags() {
        let op = ResponseOp::Sync {
            range: [0, 9],
            room_ids: vec![room_id()],
            rooms: vec![],
        };
        assert_eq!(op.op(), "SYNC");
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "SYNC");
        assert_eq!(json["range"], serde_json::json!([0, 9]));

        let op = ResponseOp::Delete { index: 3 };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "DELETE");
        assert_eq!(json["index"], 3);
    }

    #[test]
    fn test_op_roundtrip() {
        let ops = vec![
            ResponseOp::Invalidate { range: [20, 29] },
            ResponseOp::Insert {
                index: 0,
                room_id: room_id(),
                room: Some(Room::stub(room_id())),
            },
            ResponseOp::Update {
                index: 4,
                room_id: room_id(),
                room: None,
            },
        ];
        let json = serde_json::to_string(&ops).unwrap();
        let back: Vec<ResponseOp> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ops);
    }

    #[test]
    fn test_stub_room_serialises_sparsely() {
        let json = serde_json::to_value(Room::stub(room_id())).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj["room_id"], "!foo:localhost");
        assert!(!obj.contains_key("name"));
        assert!(!obj.contains_key("timeline"));
        assert!(!obj.contains_key("initial"));
        assert!(!obj.contains_key("joined_count"));
    }
}
