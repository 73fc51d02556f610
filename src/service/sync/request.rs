// =============================================================================
// Slidesync Matrix Sliding Sync Server - Request Module
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Client request types and the request-merging algebra. Every incoming
//   request is a delta against the connection's muxed request; apply_delta
//   produces the new muxed request together with the subscription and
//   per-list differences the engine acts on. Also hosts the window move
//   geometry: given a room moving between two absolute indices and the
//   list's tracked ranges, compute the index pairs each window must shift
//   through.
//
// =============================================================================

use std::collections::{HashMap, HashSet};

use ruma::{OwnedRoomId, RoomId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ranges::SliceRanges;
use super::response::ResponseOp;
use super::sortable::{RoomConnMetadata, SortKey};
use crate::cache::calculate_room_name;

/// Timeline events per room when neither the list nor the subscription says
/// otherwise
pub const DEFAULT_TIMELINE_LIMIT: u64 = 20;

/// How long a request with nothing to report blocks before returning
pub const DEFAULT_TIMEOUT_MSECS: u64 = 10_000;

/// A client sync request. Position and timeout arrive as query parameters
/// and are attached by the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub txn_id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lists: Vec<RequestList>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub room_subscriptions: HashMap<OwnedRoomId, RoomSubscription>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsubscribe_rooms: Vec<OwnedRoomId>,

    /// Opaque extensions blob, merged but never interpreted by the core
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub extensions: Value,

    // set via query params by the transport
    #[serde(skip)]
    pos: u64,
    #[serde(skip)]
    timeout_msecs: u64,
}

/// One tracked list: a window over the sorted room list plus the shape of
/// the rooms inside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestList {
    #[serde(flatten)]
    pub room_subscription: RoomSubscription,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranges: Option<SliceRanges>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<SortKey>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<RequestFilters>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slow_get_all_rooms: Option<bool>,
}

/// The per-room data shape: which state events to include and how much
/// timeline to send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomSubscription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_state: Option<Vec<[String; 2]>>,

    #[serde(default, skip_serializing_if = "u64_is_zero")]
    pub timeline_limit: u64,
}

fn u64_is_zero(n: &u64) -> bool {
    *n == 0
}

/// Filter fields evaluated against a connection's room records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spaces: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dm: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_encrypted: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_invite: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_tombstoned: Option<bool>,

    /// Room types to include; a `null` entry matches rooms with no type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub room_types: Vec<Option<String>>,

    /// Room types to exclude, takes priority over `room_types`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_room_types: Vec<Option<String>>,

    #[serde(
        default,
        rename = "room_name_like",
        skip_serializing_if = "String::is_empty"
    )]
    pub room_name_filter: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// The diff between two generations of the muxed request
#[derive(Debug, Clone, Default)]
pub struct RequestDelta {
    /// Rooms newly subscribed to
    pub subs: Vec<OwnedRoomId>,

    /// Rooms newly unsubscribed from
    pub unsubs: Vec<OwnedRoomId>,

    /// Positional list pairs, `max(|prev|, |curr|)` long
    pub lists: Vec<RequestListDelta>,
}

/// A single positional list delta
#[derive(Debug, Clone, Default)]
pub struct RequestListDelta {
    /// What was there before, if anything
    pub prev: Option<RequestList>,

    /// The combined result now tracked, if the list still exists
    pub curr: Option<RequestList>,
}

/// Merge the previous muxed request with an incoming delta request,
/// producing the next muxed request and the differences to act on. Newer
/// values win unless they are unset, in which case the older ones carry
/// over.
pub fn apply_delta(prev: Option<&Request>, next: &Request) -> (Request, RequestDelta) {
    let empty = Request::default();
    let base = prev.unwrap_or(&empty);

    let extensions = if next.extensions.is_null() {
        base.extensions.clone()
    } else {
        next.extensions.clone()
    };

    let mut lists = Vec::with_capacity(next.lists.len());
    for (i, next_list) in next.lists.iter().enumerate() {
        let existing = base.lists.get(i);
        match existing {
            None => {
                let mut list = next_list.clone();
                // default to recency sort order if missing and there is no
                // previous list to draw from
                if list.sort.as_ref().map_or(true, Vec::is_empty) {
                    list.sort = Some(vec![SortKey::ByRecency]);
                }
                lists.push(list);
            }
            Some(prev_list) => {
                let sort = match &next_list.sort {
                    Some(s) if !s.is_empty() => Some(s.clone()),
                    _ => prev_list.sort.clone(),
                };
                let required_state = next_list
                    .room_subscription
                    .required_state
                    .clone()
                    .or_else(|| prev_list.room_subscription.required_state.clone());
                let timeline_limit = if next_list.room_subscription.timeline_limit > 0 {
                    next_list.room_subscription.timeline_limit
                } else {
                    prev_list.room_subscription.timeline_limit
                };
                lists.push(RequestList {
                    room_subscription: RoomSubscription {
                        required_state,
                        timeline_limit,
                    },
                    ranges: next_list
                        .ranges
                        .clone()
                        .or_else(|| prev_list.ranges.clone()),
                    sort,
                    filters: next_list
                        .filters
                        .clone()
                        .or_else(|| prev_list.filters.clone()),
                    slow_get_all_rooms: next_list.slow_get_all_rooms.or(prev_list.slow_get_all_rooms),
                });
            }
        }
    }

    // Work out subscriptions. The operations are applied as:
    // old.subs -> apply old.unsubs (should be empty) -> apply new.subs ->
    // apply new.unsubs. If a room is both in subs and unsubs then the result
    // is unsub. This also allows clients to update their filters for an
    // existing room subscription.
    let mut delta = RequestDelta::default();
    let mut result_subs = base.room_subscriptions.clone();
    for room_id in &base.unsubscribe_rooms {
        if result_subs.remove(room_id).is_some() {
            delta.unsubs.push(room_id.clone());
        }
    }
    for (room_id, sub) in &next.room_subscriptions {
        // either updating an existing sub or a new sub, we don't care which
        result_subs.insert(room_id.clone(), sub.clone());
    }
    for room_id in &next.unsubscribe_rooms {
        if result_subs.contains_key(room_id) {
            // if this request both subscribes and unsubscribes to the same
            // room ID, don't mark this as an unsub delta
            if !next.room_subscriptions.contains_key(room_id) {
                delta.unsubs.push(room_id.clone());
            }
            result_subs.remove(room_id);
        }
    }
    delta.subs = result_subs
        .keys()
        .filter(|room_id| !base.room_subscriptions.contains_key(*room_id))
        .cloned()
        .collect();
    delta.subs.sort_unstable();
    delta.unsubs.sort_unstable();

    // the delta is as large as the longest list of lists
    let max_len = lists.len().max(base.lists.len());
    delta.lists = Vec::with_capacity(max_len);
    for i in 0..max_len {
        delta.lists.push(RequestListDelta {
            prev: base.lists.get(i).cloned(),
            curr: lists.get(i).cloned(),
        });
    }

    let result = Request {
        txn_id: next.txn_id.clone(),
        lists,
        room_subscriptions: result_subs,
        unsubscribe_rooms: Vec::new(),
        extensions,
        pos: next.pos,
        timeout_msecs: next.timeout_msecs,
    };
    (result, delta)
}

impl Request {
    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn set_pos(&mut self, pos: u64) {
        self.pos = pos;
    }

    pub fn timeout_msecs(&self) -> u64 {
        self.timeout_msecs
    }

    pub fn set_timeout_msecs(&mut self, timeout: u64) {
        self.timeout_msecs = timeout;
    }

    /// Byte-equal JSON serialisations, used by the transport to detect
    /// retried requests.
    pub fn same(&self, other: &Request) -> bool {
        match (serde_json::to_vec(self), serde_json::to_vec(other)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Reject malformed requests before they touch connection state.
    pub fn validate(&self) -> crate::error::Result<()> {
        for list in &self.lists {
            if let Some(ranges) = &list.ranges {
                ranges.validate()?;
            }
        }
        Ok(())
    }

    /// Resolve the timeline limit for a room: its subscription's limit if
    /// set, then the list's, then the default.
    pub fn timeline_limit(&self, list_index: Option<usize>, room_id: &RoomId) -> u64 {
        if let Some(sub) = self.room_subscriptions.get(room_id) {
            if sub.timeline_limit > 0 {
                return sub.timeline_limit;
            }
        }
        if let Some(list) = list_index.and_then(|i| self.lists.get(i)) {
            if list.room_subscription.timeline_limit > 0 {
                return list.room_subscription.timeline_limit;
            }
        }
        DEFAULT_TIMELINE_LIMIT
    }

    /// The required-state shape for a room: its subscription combined with
    /// the list it is being projected for.
    pub fn required_state_map(
        &self,
        list_index: Option<usize>,
        room_id: &RoomId,
    ) -> RequiredStateMap {
        let sub = self.room_subscriptions.get(room_id);
        let list_sub = list_index
            .and_then(|i| self.lists.get(i))
            .map(|l| &l.room_subscription);
        match (sub, list_sub) {
            (Some(a), Some(b)) => a.combine(b).required_state_map(),
            (Some(a), None) => a.required_state_map(),
            (None, Some(b)) => b.required_state_map(),
            (None, None) => RoomSubscription::default().required_state_map(),
        }
    }
}

impl RequestList {
    pub fn should_get_all_rooms(&self) -> bool {
        self.slow_get_all_rooms.unwrap_or(false)
    }

    /// The ranges this list tracks; an unset field tracks nothing.
    pub fn tracked_ranges(&self) -> SliceRanges {
        self.ranges.clone().unwrap_or_default()
    }

    /// The sort keys in effect for this list.
    pub fn sort_keys(&self) -> Vec<SortKey> {
        match &self.sort {
            Some(keys) if !keys.is_empty() => keys.clone(),
            _ => vec![SortKey::ByRecency],
        }
    }

    pub fn sort_order_changed(&self, next: &RequestList) -> bool {
        self.sort != next.sort
    }

    pub fn filters_changed(&self, next: &RequestList) -> bool {
        self.filters != next.filters
    }

    /// Write an insert operation for this list. Returns None for indexes not
    /// being tracked. Useful when rooms are added to the list e.g newly
    /// joined rooms.
    pub fn write_insert_op(&self, inserted_index: i64, room_id: &RoomId) -> Option<ResponseOp> {
        if inserted_index < 0 {
            return None;
        }
        self.tracked_ranges().inside(inserted_index)?;
        Some(ResponseOp::Insert {
            index: inserted_index as u64,
            room_id: room_id.to_owned(),
            room: None,
        })
    }

    /// Write a delete operation for this list. Returns None for invalid
    /// indexes or if this index isn't being tracked. Useful when rooms are
    /// removed from the list e.g left rooms.
    pub fn write_delete_op(&self, deleted_index: i64) -> Option<ResponseOp> {
        if deleted_index < 0 {
            return None;
        }
        self.tracked_ranges().inside(deleted_index)?;
        Some(ResponseOp::Delete {
            index: deleted_index as u64,
        })
    }

    /// Move a room between two absolute positions, emitting the DELETE and
    /// INSERT the client needs. Positions do not need to be inside a valid
    /// range. A move onto itself is a no-op.
    pub fn write_swap_op(
        &self,
        room_id: &RoomId,
        from_index: i64,
        to_index: i64,
    ) -> Vec<ResponseOp> {
        if from_index == to_index {
            // we only care to notify clients about moves in the list
            return Vec::new();
        }
        let mut ops = Vec::with_capacity(2);
        if from_index >= 0 {
            ops.push(ResponseOp::Delete {
                index: from_index as u64,
            });
        }
        if to_index >= 0 {
            ops.push(ResponseOp::Insert {
                index: to_index as u64,
                room_id: room_id.to_owned(),
                room: None,
            });
        }
        ops
    }

    /// Calculate the real from -> to index pairs for a move between two
    /// absolute positions, taking the list's tracked ranges into account.
    /// Returns `(pairs, false)` if the move is invisible: both positions
    /// outside all ranges with nothing jumped over.
    ///
    /// - If both positions are inside the same range, the pair is returned
    ///   as-is.
    /// - If exactly one is inside a range, the outside position snaps to the
    ///   nearest range boundary in the direction of movement.
    /// - Every range lying strictly between the two positions is jumped
    ///   over: each contributes one boundary-shift pair of its own.
    pub fn calculate_move_indexes(&self, from_index: i64, to_index: i64) -> (Vec<[i64; 2]>, bool) {
        let ranges = self.tracked_ranges();
        let from_range = ranges.inside(from_index);
        let to_range = ranges.inside(to_index);

        if let (Some(fr), Some(tr)) = (from_range, to_range) {
            if fr == tr {
                return (vec![[from_index, to_index]], true);
            }
        }

        let jumped_over = jumped_over_ranges(&ranges, from_index, to_index);
        let towards_zero = from_index > to_index;
        let jump_pair = |r: &[u64; 2]| -> [i64; 2] {
            if towards_zero {
                [r[1] as i64, r[0] as i64]
            } else {
                [r[0] as i64, r[1] as i64]
            }
        };

        if from_range.is_none() && to_range.is_none() {
            if jumped_over.is_empty() {
                return (Vec::new(), false);
            }
            return (jumped_over.iter().map(jump_pair).collect(), true);
        }

        let mut pairs = Vec::new();
        if from_range.is_some() {
            // snap the destination to the closest boundary in the direction
            // of travel
            pairs.push([
                from_index,
                ranges.closest_in_direction(from_index, to_index < from_index),
            ]);
        }
        if to_range.is_some() {
            // snap the source to the upper or lower boundary depending on the
            // direction of travel
            pairs.push([
                ranges.closest_in_direction(to_index, from_index < to_index),
                to_index,
            ]);
        }
        pairs.extend(jumped_over.iter().map(jump_pair));
        (pairs, true)
    }
}

/// Ranges whose bounds both lie strictly between the two move positions.
fn jumped_over_ranges(ranges: &SliceRanges, from_index: i64, to_index: i64) -> Vec<[u64; 2]> {
    let lo = from_index.min(to_index);
    let hi = from_index.max(to_index);
    ranges
        .iter()
        .copied()
        .filter(|r| {
            let (rlo, rhi) = (r[0] as i64, r[1] as i64);
            rlo > lo && rlo < hi && rhi > lo && rhi < hi
        })
        .collect()
}

impl RoomSubscription {
    /// Union of two subscriptions: the larger timeline limit and both
    /// required-state sets.
    pub fn combine(&self, other: &RoomSubscription) -> RoomSubscription {
        let timeline_limit = self.timeline_limit.max(other.timeline_limit);
        let required_state = match (&self.required_state, &other.required_state) {
            (None, None) => None,
            (a, b) => {
                let mut merged = a.clone().unwrap_or_default();
                merged.extend(b.clone().unwrap_or_default());
                Some(merged)
            }
        };
        RoomSubscription {
            required_state,
            timeline_limit,
        }
    }

    /// Collapse the required-state tuples into an absorbed-wildcard map where
    /// the largest covering tuple wins: `[B,*]` encompasses `[B,2]`, and
    /// `[*,*]` encompasses everything.
    pub fn required_state_map(&self) -> RequiredStateMap {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        let mut wildcard_state_key_types = HashSet::new();
        let mut wildcard_type_state_keys = Vec::new();
        for tuple in self.required_state.iter().flatten() {
            if tuple[0] == "*" {
                if tuple[1] == "*" {
                    return RequiredStateMap::all_state();
                }
                wildcard_type_state_keys.push(tuple[1].clone());
                continue;
            }
            if tuple[1] == "*" {
                wildcard_state_key_types.insert(tuple[0].clone());
            } else {
                map.entry(tuple[0].clone()).or_default().push(tuple[1].clone());
            }
        }
        RequiredStateMap {
            event_types_with_wildcard_state_keys: wildcard_state_key_types,
            state_keys_for_wildcard_event_type: wildcard_type_state_keys,
            map,
            all_state: false,
        }
    }
}

/// An absorbed-wildcard representation of a set of (event type, state key)
/// tuples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequiredStateMap {
    event_types_with_wildcard_state_keys: HashSet<String>,
    state_keys_for_wildcard_event_type: Vec<String>,
    map: HashMap<String, Vec<String>>,
    all_state: bool,
}

impl RequiredStateMap {
    pub fn all_state() -> Self {
        Self {
            all_state: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.all_state
            && self.event_types_with_wildcard_state_keys.is_empty()
            && self.state_keys_for_wildcard_event_type.is_empty()
            && self.map.is_empty()
    }

    /// Whether a state event with this type and state key is requested.
    pub fn include(&self, event_type: &str, state_key: &str) -> bool {
        if self.all_state {
            return true;
        }
        if self.event_types_with_wildcard_state_keys.contains(event_type) {
            return true;
        }
        if self
            .state_keys_for_wildcard_event_type
            .iter()
            .any(|sk| sk == state_key)
        {
            return true;
        }
        self.map
            .get(event_type)
            .is_some_and(|keys| keys.iter().any(|sk| sk == state_key))
    }
}

impl RequestFilters {
    /// Whether a room record is a member of a list with these filters.
    pub fn include(&self, room: &RoomConnMetadata) -> bool {
        if let Some(want) = self.is_encrypted {
            if want != room.metadata.encrypted {
                return false;
            }
        }
        if let Some(want) = self.is_tombstoned {
            if want != room.metadata.tombstoned {
                return false;
            }
        }
        if let Some(want) = self.is_dm {
            if want != room.is_dm {
                return false;
            }
        }
        if let Some(want) = self.is_invite {
            if want != room.is_invite {
                return false;
            }
        }
        if !self.room_name_filter.is_empty()
            && !calculate_room_name(&room.metadata, 5)
                .to_lowercase()
                .contains(&self.room_name_filter.to_lowercase())
        {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| room.tags.contains(t)) {
            return false;
        }
        // read not_room_types first as it takes priority
        if nullable_string_exists(&self.not_room_types, &room.metadata.room_type) {
            return false; // explicitly excluded
        }
        if !self.room_types.is_empty() {
            // either explicitly included or implicitly excluded
            return nullable_string_exists(&self.room_types, &room.metadata.room_type);
        }
        if !self.spaces.is_empty() {
            // ensure this room is a member of one of these spaces
            return self.spaces.iter().any(|s| room.spaces.contains(s));
        }
        true
    }
}

/// Find `null` or literal string matches.
fn nullable_string_exists(arr: &[Option<String>], input: &Option<String>) -> bool {
    arr.iter().any(|entry| entry == input)
}
