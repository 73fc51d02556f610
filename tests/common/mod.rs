// =============================================================================
// Slidesync Matrix Sliding Sync Server - Test Matchers
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Matcher combinators for asserting on sync responses, plus fixtures for
//   seeding the caches behind a test connection.
//
// =============================================================================

#![allow(dead_code)]

use std::sync::Arc;

use ruma::{OwnedRoomId, OwnedUserId, RoomId, UserId};
use serde_json::Value;

use slidesync::cache::{EventData, GlobalCache, RoomMetadata, UserCache, UserRoomData};
use slidesync::service::sync::{Conn, ConnState, Response, ResponseList, ResponseOp, Room};
use slidesync::SyncConfig;

pub type MatchResult = Result<(), String>;
pub type RoomMatcher = Box<dyn Fn(&Room) -> MatchResult>;
pub type OpMatcher = Box<dyn Fn(&ResponseOp) -> MatchResult>;
pub type ListMatcher = Box<dyn Fn(&ResponseList) -> MatchResult>;
pub type RespMatcher = Box<dyn Fn(&Response) -> MatchResult>;

// ========== Room matchers ==========

pub fn match_room_name(name: &str) -> RoomMatcher {
    let name = name.to_string();
    Box::new(move |r| match &r.name {
        Some(got) if *got == name => Ok(()),
        got => Err(format!("name mismatch, got {:?} want {}", got, name)),
    })
}

pub fn match_room_initial(initial: bool) -> RoomMatcher {
    Box::new(move |r| {
        if r.initial != initial {
            return Err(format!("initial: got {} want {}", r.initial, initial));
        }
        Ok(())
    })
}

pub fn match_room_notification_count(count: i64) -> RoomMatcher {
    Box::new(move |r| {
        if r.notification_count != count {
            return Err(format!(
                "notification count mismatch, got {} want {}",
                r.notification_count, count
            ));
        }
        Ok(())
    })
}

pub fn match_room_highlight_count(count: i64) -> RoomMatcher {
    Box::new(move |r| {
        if r.highlight_count != count {
            return Err(format!(
                "highlight count mismatch, got {} want {}",
                r.highlight_count, count
            ));
        }
        Ok(())
    })
}

/// Match the timeline with exactly these events in exactly this order.
pub fn match_room_timeline(events: Vec<Value>) -> RoomMatcher {
    Box::new(move |r| {
        if r.timeline.len() != events.len() {
            return Err(format!(
                "timeline length mismatch: got {} want {}",
                r.timeline.len(),
                events.len()
            ));
        }
        for (i, want) in events.iter().enumerate() {
            if &r.timeline[i] != want {
                return Err(format!(
                    "timeline[{}]\ngot  {}\nwant {}",
                    i, r.timeline[i], want
                ));
            }
        }
        Ok(())
    })
}

/// Required state can come back in any order.
pub fn match_room_required_state(events: Vec<Value>) -> RoomMatcher {
    Box::new(move |r| {
        if r.required_state.len() != events.len() {
            return Err(format!(
                "required state length mismatch, got {} want {}",
                r.required_state.len(),
                events.len()
            ));
        }
        for want in &events {
            if !r.required_state.contains(want) {
                return Err(format!(
                    "required state want event {} but it does not exist",
                    want
                ));
            }
        }
        Ok(())
    })
}

// ========== Op matchers ==========

pub fn match_v3_sync_op(start: u64, end: u64, room_ids: &[&OwnedRoomId]) -> OpMatcher {
    let want: Vec<OwnedRoomId> = room_ids.iter().map(|r| (*r).clone()).collect();
    Box::new(move |op| match op {
        ResponseOp::Sync {
            range, room_ids, ..
        } => {
            if *range != [start, end] {
                return Err(format!("SYNC: got range {:?} want [{},{}]", range, start, end));
            }
            if *room_ids != want {
                return Err(format!("SYNC: got rooms {:?} want {:?}", room_ids, want));
            }
            Ok(())
        }
        other => Err(format!("op: {} != SYNC", other.op())),
    })
}

pub fn match_v3_invalidate_op(start: u64, end: u64) -> OpMatcher {
    Box::new(move |op| match op {
        ResponseOp::Invalidate { range } => {
            if *range != [start, end] {
                return Err(format!(
                    "INVALIDATE: got range {:?} want [{},{}]",
                    range, start, end
                ));
            }
            Ok(())
        }
        other => Err(format!("op: {} != INVALIDATE", other.op())),
    })
}

pub fn match_v3_insert_op(index: u64, want_room_id: &RoomId) -> OpMatcher {
    let want = want_room_id.to_owned();
    Box::new(move |op| match op {
        ResponseOp::Insert { index: got, room_id, .. } => {
            if *got != index {
                return Err(format!("INSERT: got index {} want {}", got, index));
            }
            if *room_id != want {
                return Err(format!("INSERT: got {} want {}", room_id, want));
            }
            Ok(())
        }
        other => Err(format!("op: {} != INSERT", other.op())),
    })
}

pub fn match_v3_delete_op(index: u64) -> OpMatcher {
    Box::new(move |op| match op {
        ResponseOp::Delete { index: got } => {
            if *got != index {
                return Err(format!("DELETE: got room index {} want {}", got, index));
            }
            Ok(())
        }
        other => Err(format!("op: {} != DELETE", other.op())),
    })
}

pub fn match_v3_update_op(index: u64, want_room_id: &RoomId) -> OpMatcher {
    let want = want_room_id.to_owned();
    Box::new(move |op| match op {
        ResponseOp::Update { index: got, room_id, .. } => {
            if *got != index {
                return Err(format!("UPDATE: got index {} want {}", got, index));
            }
            if *room_id != want {
                return Err(format!("UPDATE: got {} want {}", room_id, want));
            }
            Ok(())
        }
        other => Err(format!("op: {} != UPDATE", other.op())),
    })
}

// ========== List matchers ==========

pub fn match_v3_count(want: u64) -> ListMatcher {
    Box::new(move |list| {
        if list.count != want {
            return Err(format!("list got count {} want {}", list.count, want));
        }
        Ok(())
    })
}

/// Match the op stream strictly: same length, each op checked in order.
pub fn match_v3_ops(matchers: Vec<OpMatcher>) -> ListMatcher {
    Box::new(move |list| {
        if list.ops.len() != matchers.len() {
            return Err(format!(
                "ops: got {} ops want {}",
                list.ops.len(),
                matchers.len()
            ));
        }
        for (i, (op, m)) in list.ops.iter().zip(matchers.iter()).enumerate() {
            m(op).map_err(|e| format!("op[{}]({}) - {}", i, op.op(), e))?;
        }
        Ok(())
    })
}

// ========== Response matchers ==========

pub fn match_list(index: usize, matchers: Vec<ListMatcher>) -> RespMatcher {
    Box::new(move |res| {
        let list = res
            .lists
            .get(index)
            .ok_or_else(|| format!("list {} does not exist, got {} lists", index, res.lists.len()))?;
        for m in &matchers {
            m(list).map_err(|e| format!("list[{}]: {}", index, e))?;
        }
        Ok(())
    })
}

pub fn match_no_v3_ops() -> RespMatcher {
    Box::new(|res| {
        for (i, list) in res.lists.iter().enumerate() {
            if !list.ops.is_empty() {
                return Err(format!("list {} got {} ops, want none", i, list.ops.len()));
            }
        }
        Ok(())
    })
}

pub fn match_room_subscription(room_id: &RoomId, matchers: Vec<RoomMatcher>) -> RespMatcher {
    let room_id = room_id.to_owned();
    Box::new(move |res| {
        let room = res
            .rooms
            .get(&room_id)
            .ok_or_else(|| format!("want sub for {} but it was missing", room_id))?;
        for m in &matchers {
            m(room).map_err(|e| format!("subscription[{}]: {}", room_id, e))?;
        }
        Ok(())
    })
}

pub fn match_room_subscriptions_strict(want: usize) -> RespMatcher {
    Box::new(move |res| {
        if res.rooms.len() != want {
            return Err(format!("got {} subs want {}", res.rooms.len(), want));
        }
        Ok(())
    })
}

pub fn match_txn_id(txn_id: &str) -> RespMatcher {
    let txn_id = txn_id.to_string();
    Box::new(move |res| match &res.txn_id {
        Some(got) if *got == txn_id => Ok(()),
        got => Err(format!("txn_id: got {:?} want {}", got, txn_id)),
    })
}

/// Assert every matcher holds, panicking with the serialized response on
/// failure.
pub fn match_response(res: &Response, matchers: Vec<RespMatcher>) {
    for m in matchers {
        if let Err(err) = m(res) {
            let body = serde_json::to_string_pretty(res).unwrap_or_default();
            panic!("match_response: {}\n{}", err, body);
        }
    }
}

// ========== Fixtures ==========

/// A seeded pair of caches plus the user they belong to.
pub struct TestHarness {
    pub user_id: OwnedUserId,
    pub global: Arc<GlobalCache>,
    pub user_cache: Arc<UserCache>,
}

impl TestHarness {
    pub fn new(user: &str) -> Self {
        let user_id = UserId::parse(user).expect("valid user id");
        let global = GlobalCache::new();
        let user_cache = UserCache::new(user_id.clone(), global.clone());
        Self {
            user_id,
            global,
            user_cache,
        }
    }

    /// Seed `n` joined rooms named r0..rN with strictly descending recency,
    /// so by_recency order matches index order. Each room gets one timeline
    /// event.
    pub async fn seed_rooms(&self, n: usize) -> Vec<OwnedRoomId> {
        let mut room_ids = Vec::with_capacity(n);
        for i in 0..n {
            let room_id: OwnedRoomId =
                RoomId::parse(format!("!r{i:02}:localhost")).expect("valid room id");
            let ts = 100_000 - (i as u64) * 100;
            let mut metadata = RoomMetadata::new(room_id.clone());
            metadata.name = Some(format!("Room {i}"));
            metadata.last_message_timestamp = ts;
            metadata.joined_count = 2;
            self.global.insert_room(metadata).await;
            self.global.add_joined_room(&self.user_id, &room_id).await;
            self.user_cache
                .set_room_data(
                    room_id.clone(),
                    UserRoomData {
                        timeline: vec![timeline_event(&room_id, ts)],
                        ..Default::default()
                    },
                )
                .await;
            room_ids.push(room_id);
        }
        room_ids
    }

    /// Push one event through the caches the way the poller would: commit a
    /// position, fold into the global cache, fan out via the user cache.
    pub async fn send_event(&self, room_id: &RoomId, event: Value, timestamp: u64) -> i64 {
        let pos = self.global.advance_position();
        let data = EventData::new(room_id.to_owned(), event, timestamp, pos);
        self.global.on_new_event(&data).await;
        self.user_cache.on_new_event(data).await;
        pos
    }

    /// A fresh connection against these caches.
    pub async fn new_conn(&self) -> Arc<Conn> {
        let state = ConnState::new(
            self.user_id.clone(),
            self.user_cache.clone(),
            self.global.clone(),
            SyncConfig::default(),
        )
        .await;
        Conn::new(state)
    }
}

/// Replay an op stream onto a client-side room array the way a real client
/// would, then verify no room occupies two positions.
pub fn apply_ops(window: &mut Vec<OwnedRoomId>, ops: &[ResponseOp]) {
    for op in ops {
        match op {
            ResponseOp::Sync {
                range, room_ids, ..
            } => {
                for (offset, room_id) in room_ids.iter().enumerate() {
                    let index = range[0] as usize + offset;
                    if index < window.len() {
                        window[index] = room_id.clone();
                    } else if index == window.len() {
                        window.push(room_id.clone());
                    }
                }
            }
            ResponseOp::Delete { index } => {
                if (*index as usize) < window.len() {
                    window.remove(*index as usize);
                }
            }
            ResponseOp::Insert { index, room_id, .. } => {
                let index = (*index as usize).min(window.len());
                window.insert(index, room_id.clone());
            }
            ResponseOp::Update { .. } | ResponseOp::Invalidate { .. } => {}
        }
    }
    for (i, room_id) in window.iter().enumerate() {
        for (j, other) in window.iter().enumerate().skip(i + 1) {
            assert_ne!(
                room_id, other,
                "room {room_id} occupies both position {i} and {j}"
            );
        }
    }
}

pub fn timeline_event(room_id: &RoomId, ts: u64) -> Value {
    serde_json::json!({
        "type": "m.room.message",
        "sender": "@bob:localhost",
        "origin_server_ts": ts,
        "content": {"msgtype": "m.text", "body": format!("hello {room_id}")},
    })
}
