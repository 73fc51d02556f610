// =============================================================================
// Slidesync Matrix Sliding Sync Server - Connection State Module
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
//   The per-connection list-projection engine. ConnState owns the muxed
//   request, the sorted room list behind each tracked list, the active room
//   subscriptions and the event inbox. Incoming requests are diffed against
//   the muxed request into window and subscription deltas; live events move
//   rooms through the sorted lists and are translated into the minimal
//   operation stream that keeps each client window consistent.
//
// Features:
//   • Request merging with sticky list fields
//   • Canonicalised window deltas (SYNC / INVALIDATE)
//   • Live loop over inbox, timer and cancellation
//   • Clamped move reporting for multi-window clients
//
// Architecture:
//   • Single-threaded per connection: every mutation happens under the
//     connection's exclusive lock
//   • Cross-thread event delivery only through the bounded inbox
//
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ruma::{OwnedRoomId, OwnedUserId, RoomId, UserId};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::ranges::SliceRanges;
use super::request::{apply_delta, Request, RequestList, RequestListDelta, RoomSubscription};
use super::response::{Response, ResponseList, ResponseOp, Room};
use super::sortable::{RoomConnMetadata, SortableRooms};
use crate::cache::{
    calculate_room_name, EventData, GlobalCache, UserCache, UserCacheListener, UserRoomData,
};
use crate::config::SyncConfig;
use crate::error::{Error, Result};

/// Sentinel for "initial load has not happened yet"
const POSITION_NONE: i64 = -1;

/// The registration handle the user cache delivers callbacks through. Holds
/// the sending half of the bounded inbox; it can wake the connection but
/// never owns its lifetime.
pub struct ConnStateInbox {
    user_id: OwnedUserId,
    tx: mpsc::Sender<EventData>,
    load_position: AtomicI64,
    dead: AtomicBool,
    cancel: CancellationToken,
    send_timeout: Duration,
    global_cache: Arc<GlobalCache>,
}

impl ConnStateInbox {
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    fn set_load_position(&self, pos: i64) {
        self.load_position.store(pos, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserCacheListener for ConnStateInbox {
    async fn on_new_event(&self, event: &EventData) {
        let load_position = self.load_position.load(Ordering::SeqCst);
        if event.latest_pos != 0 && event.latest_pos <= load_position {
            // already included when the room list was loaded initially
            return;
        }
        match tokio::time::timeout(self.send_timeout, self.tx.send(event.clone())).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                // receiver side is gone: the connection was torn down
            }
            Err(_) => {
                warn!(
                    user_id = %self.user_id,
                    room_id = %event.room_id,
                    "❌ cannot send event to connection, buffer exceeded"
                );
                self.dead.store(true, Ordering::SeqCst);
                self.cancel.cancel();
            }
        }
    }

    async fn on_unread_counts_changed(
        &self,
        _user_id: &UserId,
        room_id: &RoomId,
        data: UserRoomData,
        has_count_decreased: bool,
    ) {
        if !has_count_decreased {
            // increases always arrive with their causal event
            return;
        }
        let timestamp = self
            .global_cache
            .load_room(room_id)
            .await
            .map(|m| m.last_message_timestamp)
            .unwrap_or(0);
        self.on_new_event(&EventData {
            room_id: room_id.to_owned(),
            event_type: String::new(),
            state_key: None,
            event: None,
            timestamp,
            latest_pos: 0,
            user_room_data: Some(data),
        })
        .await;
    }
}

/// Tracks all high-level connection state for one connection: the muxed
/// request and the sorted room list behind each tracked list. It doesn't
/// track session IDs or positions of the connection.
pub struct ConnState {
    user_id: OwnedUserId,
    muxed_req: Option<Request>,

    /// Every room the connection knows about, keyed by room ID. The
    /// per-list sorted views hold copies restricted by each list's filter.
    all_rooms: HashMap<OwnedRoomId, RoomConnMetadata>,

    /// Sorted, filtered view per tracked list, positionally matching the
    /// muxed request's lists
    lists: Vec<SortableRooms>,

    room_subscriptions: HashMap<OwnedRoomId, RoomSubscription>,
    load_position: i64,

    /// Receiving half of the bounded inbox the poll loops push updates into
    rx: mpsc::Receiver<EventData>,
    inbox: Arc<ConnStateInbox>,

    global_cache: Arc<GlobalCache>,
    user_cache: Arc<UserCache>,
    user_cache_id: u64,

    destroyed: bool,
    config: SyncConfig,
}

impl ConnState {
    /// Create connection state and register its inbox with the user cache.
    pub async fn new(
        user_id: OwnedUserId,
        user_cache: Arc<UserCache>,
        global_cache: Arc<GlobalCache>,
        config: SyncConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.max_pending_event_updates);
        let inbox = Arc::new(ConnStateInbox {
            user_id: user_id.clone(),
            tx,
            load_position: AtomicI64::new(POSITION_NONE),
            dead: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            send_timeout: config.event_buffer_timeout(),
            global_cache: global_cache.clone(),
        });
        let listener: Arc<dyn UserCacheListener> = inbox.clone();
        let user_cache_id = user_cache.subscribe(&listener).await;
        Self {
            user_id,
            muxed_req: None,
            all_rooms: HashMap::new(),
            lists: Vec::new(),
            room_subscriptions: HashMap::new(),
            load_position: POSITION_NONE,
            rx,
            inbox,
            global_cache,
            user_cache,
            user_cache_id,
            destroyed: false,
            config,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Token cancelled when the connection dies; the live loop selects on it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inbox.cancel.clone()
    }

    /// Entry point for client requests. Guaranteed to be called sequentially
    /// per connection by the owning Conn's lock.
    #[instrument(level = "debug", skip(self, req), fields(user_id = %self.user_id))]
    pub async fn handle_incoming_request(&mut self, req: Request) -> Result<Response> {
        if self.destroyed {
            return Err(Error::ConnectionClosed);
        }
        if self.inbox.is_dead() {
            self.destroy().await;
            return Err(Error::ConnectionClosed);
        }
        req.validate()?;
        self.validate_timeline_limits(&req)?;
        if self.load_position == POSITION_NONE {
            self.load().await?;
        }
        self.on_incoming_request(req).await
    }

    fn validate_timeline_limits(&self, req: &Request) -> Result<()> {
        let max = self.config.max_timeline_limit;
        let over = req
            .lists
            .iter()
            .map(|l| l.room_subscription.timeline_limit)
            .chain(req.room_subscriptions.values().map(|s| s.timeline_limit))
            .any(|limit| limit > max);
        if over {
            return Err(Error::BadRequest(format!(
                "timeline limit exceeds maximum allowed ({max})"
            )));
        }
        Ok(())
    }

    /// Load the initial joined room list and cache the fields we care about
    /// like the room name. The load position is remembered so events already
    /// covered by this snapshot are dropped at the inbox, guarding against
    /// double processing when events race the first request.
    async fn load(&mut self) -> Result<()> {
        let (load_position, joined) = self.global_cache.load_joined_rooms(&self.user_id).await?;
        let mut all_rooms = HashMap::with_capacity(joined.len());
        for mut metadata in joined {
            metadata.remove_hero(&self.user_id);
            let user_data = self.user_cache.load_room_data(&metadata.room_id).await;
            let record = RoomConnMetadata::new(metadata, &user_data);
            all_rooms.insert(record.room_id().to_owned(), record);
        }
        debug!(
            user_id = %self.user_id,
            rooms = all_rooms.len(),
            load_position,
            "📥 initial room list loaded"
        );
        self.all_rooms = all_rooms;
        self.load_position = load_position;
        self.inbox.set_load_position(load_position);
        Ok(())
    }

    /// Fires when the client makes a request. Requests are linearised by the
    /// owning Conn so it is safe to modify ConnState without further locking.
    async fn on_incoming_request(&mut self, req: Request) -> Result<Response> {
        let (next_muxed, delta) = apply_delta(self.muxed_req.as_ref(), &req);
        self.muxed_req = Some(next_muxed);

        // resolve subscription changes first so new subs get initial payloads
        let rooms_payload = self
            .update_room_subscriptions(&delta.subs, &delta.unsubs)
            .await?;

        let mut lists = Vec::with_capacity(delta.lists.len());
        let mut any_same = false;
        let mut total_ops = 0;
        for (i, list_delta) in delta.lists.iter().enumerate() {
            let (list, had_same) = self.handle_list_delta(i, list_delta).await?;
            any_same |= had_same;
            total_ops += list.ops.len();
            lists.push(list);
        }
        let tracked = self.muxed_req.as_ref().map_or(0, |r| r.lists.len());
        self.lists.truncate(tracked);

        let mut response = Response {
            next: String::new(),
            txn_id: None,
            lists,
            rooms: rooms_payload,
            extensions: Value::Null,
        };

        // do live tracking if the windows didn't change and we have nothing
        // to tell the client yet
        if any_same && total_ops == 0 && response.rooms.is_empty() {
            self.live_update(&mut response).await?;
        }
        Ok(response)
    }

    /// Apply one positional list delta, producing that list's response slice
    /// and whether any window carried over unchanged.
    async fn handle_list_delta(
        &mut self,
        index: usize,
        delta: &RequestListDelta,
    ) -> Result<(ResponseList, bool)> {
        match (&delta.prev, &delta.curr) {
            // a new list came into existence
            (None, Some(curr)) => {
                let state = self.build_list(curr);
                self.lists.push(state);
                let mut ops = Vec::new();
                for range in curr.tracked_ranges().iter() {
                    ops.push(self.write_sync_op(index, *range).await?);
                }
                Ok((
                    ResponseList {
                        count: self.lists[index].len() as u64,
                        ops,
                    },
                    false,
                ))
            }
            (Some(prev), Some(curr)) => {
                let sort_changed = prev.sort_order_changed(curr);
                let filters_changed = prev.filters_changed(curr);
                let curr_ranges = curr.tracked_ranges();
                let mut ops = Vec::new();
                let mut has_same = false;
                if sort_changed || filters_changed {
                    // the ordering (or membership) changed under the client:
                    // invalidate everything previously synced, rebuild and
                    // re-SYNC every tracked window
                    for range in curr_ranges.iter() {
                        ops.push(ResponseOp::Invalidate { range: *range });
                    }
                    if filters_changed {
                        self.lists[index] = self.build_list(curr);
                    } else {
                        let keys = curr.sort_keys();
                        self.lists[index].sort(&keys);
                    }
                    for range in curr_ranges.iter() {
                        ops.push(self.write_sync_op(index, *range).await?);
                    }
                } else {
                    let range_delta = prev.tracked_ranges().delta(&curr_ranges);
                    for range in range_delta.removed.iter() {
                        ops.push(ResponseOp::Invalidate { range: *range });
                    }
                    for range in range_delta.added.iter() {
                        ops.push(self.write_sync_op(index, *range).await?);
                    }
                    has_same = !range_delta.same.is_empty();
                }
                Ok((
                    ResponseList {
                        count: self.lists[index].len() as u64,
                        ops,
                    },
                    has_same,
                ))
            }
            // the list was dropped from the request: its windows are gone
            (Some(prev), None) => {
                let ops = prev
                    .tracked_ranges()
                    .iter()
                    .map(|range| ResponseOp::Invalidate { range: *range })
                    .collect();
                Ok((ResponseList { count: 0, ops }, false))
            }
            (None, None) => Ok((ResponseList::default(), false)),
        }
    }

    /// Materialise the sorted view for a list from the connection's rooms.
    fn build_list(&self, list: &RequestList) -> SortableRooms {
        let rooms: Vec<RoomConnMetadata> = self
            .all_rooms
            .values()
            .filter(|room| list.filters.as_ref().map_or(true, |f| f.include(room)))
            .cloned()
            .collect();
        let mut sorted = SortableRooms::new(rooms);
        sorted.sort(&list.sort_keys());
        sorted
    }

    /// Send full room data for a freshly tracked window.
    async fn write_sync_op(&self, list_index: usize, range: [u64; 2]) -> Result<ResponseOp> {
        let room_ids: Vec<OwnedRoomId> = {
            let slices = SliceRanges(vec![range]).slice_into(self.lists[list_index].as_slice());
            slices[0]
                .iter()
                .map(|room| room.room_id().to_owned())
                .collect()
        };
        let rooms = self.initial_room_data(Some(list_index), &room_ids).await?;
        Ok(ResponseOp::Sync {
            range,
            room_ids,
            rooms,
        })
    }

    /// Resolve new subscriptions into initial payloads and drop stale ones.
    async fn update_room_subscriptions(
        &mut self,
        subs: &[OwnedRoomId],
        unsubs: &[OwnedRoomId],
    ) -> Result<HashMap<OwnedRoomId, Room>> {
        let mut result = HashMap::new();
        for room_id in subs {
            let sub = self
                .muxed_req
                .as_ref()
                .and_then(|req| req.room_subscriptions.get(room_id))
                .cloned();
            let Some(sub) = sub else {
                warn!(
                    room_id = %room_id,
                    "room listed in subscriptions but there is no subscription information in the request, ignoring room subscription"
                );
                continue;
            };
            self.room_subscriptions.insert(room_id.clone(), sub);
            let rooms = self
                .initial_room_data(None, std::slice::from_ref(room_id))
                .await?;
            if let Some(room) = rooms.into_iter().next() {
                result.insert(room_id.clone(), room);
            }
        }
        for room_id in unsubs {
            self.room_subscriptions.remove(room_id);
        }
        Ok(result)
    }

    /// Block until there is something to report, the request times out or
    /// the connection is cancelled. One event is processed per wake-up;
    /// later drains happen on the next request so op batches stay small and
    /// client transitions stay atomic.
    async fn live_update(&mut self, response: &mut Response) -> Result<()> {
        let timeout = match self.muxed_req.as_ref().map(|r| r.timeout_msecs()) {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => self.config.default_timeout(),
        };
        let cancel = self.inbox.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // client gave up or the connection is being torn down:
                    // return whatever was accumulated, never an error
                    debug!(user_id = %self.user_id, "live loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(timeout) => {
                    break;
                }
                maybe_event = self.rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    if self.process_live_event(event, response).await? {
                        break;
                    }
                    // not all update events wake up the stream, keep waiting
                }
            }
        }
        Ok(())
    }

    /// Fold one live event into the sorted lists and emit the ops conveying
    /// the move. Returns whether the response now has something to report.
    async fn process_live_event(
        &mut self,
        event: EventData,
        response: &mut Response,
    ) -> Result<bool> {
        if event.latest_pos != 0 && event.latest_pos <= self.load_position {
            // raced the initial load; already reflected in the snapshot
            return Ok(false);
        }
        if event.latest_pos > self.load_position {
            self.load_position = event.latest_pos;
            self.inbox.set_load_position(event.latest_pos);
        }

        let record = match self.all_rooms.get_mut(&event.room_id) {
            Some(record) => {
                record.last_message_timestamp = event.timestamp;
                if let Some(data) = &event.user_room_data {
                    record.notification_count = data.notification_count;
                    record.highlight_count = data.highlight_count;
                }
                record.clone()
            }
            None => {
                // the user may have just joined the room hence not have an
                // entry in the lists yet
                let mut metadata = self.global_cache.load_room(&event.room_id).await?;
                metadata.last_message_timestamp = event.timestamp;
                metadata.remove_hero(&self.user_id);
                let user_data = self.user_cache.load_room_data(&event.room_id).await;
                let record = RoomConnMetadata::new(metadata, &user_data);
                self.all_rooms
                    .insert(event.room_id.clone(), record.clone());
                record
            }
        };

        let muxed = self
            .muxed_req
            .clone()
            .ok_or_else(|| Error::Internal("live loop without a muxed request".to_string()))?;

        let subscribed = self.room_subscriptions.contains_key(&event.room_id);
        if subscribed {
            let room = self.delta_room_data(&event).await;
            response.rooms.insert(event.room_id.clone(), room);
        }
        let mut produced = subscribed;

        for (list_index, list) in muxed.lists.iter().enumerate() {
            if list_index >= self.lists.len() {
                break;
            }
            let from_index = match self.lists[list_index].index_of(&event.room_id) {
                Some(index) => {
                    let tracked = self.lists[list_index].get_mut(index).expect("indexed room");
                    tracked.last_message_timestamp = event.timestamp;
                    if let Some(data) = &event.user_room_data {
                        tracked.notification_count = data.notification_count;
                        tracked.highlight_count = data.highlight_count;
                    }
                    index
                }
                None => {
                    if !list.filters.as_ref().map_or(true, |f| f.include(&record)) {
                        continue;
                    }
                    let index = self.lists[list_index].len();
                    self.lists[list_index].push(record.clone());
                    index
                }
            };

            let keys = list.sort_keys();
            self.lists[list_index].sort(&keys);
            let Some(to_index) = self.lists[list_index].index_of(&event.room_id) else {
                continue;
            };
            let from_index = from_index as i64;
            let mut to_index = to_index as i64;
            debug!(
                user_id = %self.user_id,
                room_id = %event.room_id,
                list = list_index,
                from = from_index,
                to = to_index,
                event_ts = event.timestamp,
                "🔀 room moved"
            );

            let ranges = list.tracked_ranges();
            let mut reported = event.clone();
            if ranges.inside(to_index).is_none() {
                // the destination isn't tracked: every tracked room below it
                // shifted one slot, so the room entering at the window edge
                // is the one to report. E.g. tracking [10,20] when room 24
                // jumps to position 0 means the old occupant of 9 now sits
                // at 10.
                to_index = ranges.upper_clamp(to_index);
                if to_index >= self.lists[list_index].len() as i64 {
                    warn!(
                        to = to_index,
                        size = self.lists[list_index].len(),
                        "cannot move to index, it's greater than the list of sorted rooms"
                    );
                    continue;
                }
                if to_index == -1 {
                    debug!(
                        room_id = %event.room_id,
                        "room moved but not in tracked ranges, ignoring"
                    );
                    continue;
                }
                let edge_room_id = self.lists[list_index]
                    .get(to_index as usize)
                    .expect("clamped index in bounds")
                    .room_id()
                    .to_owned();
                let limit = muxed.timeline_limit(Some(list_index), &edge_room_id);
                let datas = self
                    .user_cache
                    .lazily_load_room_datas(
                        self.load_position,
                        std::slice::from_ref(&edge_room_id),
                        limit as usize,
                    )
                    .await;
                let last_event = datas
                    .get(&edge_room_id)
                    .and_then(|data| data.timeline.last().cloned());
                reported = EventData {
                    room_id: edge_room_id,
                    event_type: String::new(),
                    state_key: None,
                    event: last_event,
                    timestamp: event.timestamp,
                    latest_pos: event.latest_pos,
                    user_room_data: None,
                };
            }

            let only_send_room_id = !self.room_subscriptions.contains_key(&reported.room_id);
            let ops = self
                .move_room(
                    list_index,
                    &reported,
                    from_index,
                    to_index,
                    &ranges,
                    only_send_room_id,
                )
                .await?;
            if !ops.is_empty() {
                produced = true;
                response.lists[list_index].ops.extend(ops);
            }
        }
        Ok(produced)
    }

    /// Move a room from an absolute index position to another absolute
    /// position. For example with 1,2,3,4,5 tracking [0,4]:
    ///   3 bumps to top -> 3,1,2,4,5 -> DELETE index=2, INSERT val=3 index=0
    ///   7 bumps to top -> 7,1,2,3,4 -> DELETE index=4, INSERT val=7 index=0
    async fn move_room(
        &self,
        list_index: usize,
        event: &EventData,
        from_index: i64,
        to_index: i64,
        ranges: &SliceRanges,
        only_send_room_id: bool,
    ) -> Result<Vec<ResponseOp>> {
        if from_index == to_index {
            // an UPDATE, nice and easy because nothing moves in the list
            let room = if only_send_room_id {
                Room::stub(event.room_id.clone())
            } else {
                self.delta_room_data(event).await
            };
            return Ok(vec![ResponseOp::Update {
                index: from_index as u64,
                room_id: event.room_id.clone(),
                room: Some(room),
            }]);
        }
        // work out which index to DELETE. This varies depending on where the
        // room was and how much of the list we are tracking. E.g moving to
        // index=0 with ranges [0,99],[100,199] and an update in pos 150 ->
        // DELETE 150, but without [100,199] tracked we would DELETE 99: the
        // edge of the window the room departed through.
        let delete_index = if ranges.inside(from_index).is_some() {
            from_index
        } else {
            ranges.lower_clamp(from_index)
        };
        let room = if only_send_room_id {
            Room::stub(event.room_id.clone())
        } else {
            self.initial_room_data(Some(list_index), std::slice::from_ref(&event.room_id))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| Error::Internal("projection for moved room missing".to_string()))?
        };
        let mut ops = Vec::with_capacity(2);
        if delete_index >= 0 {
            ops.push(ResponseOp::Delete {
                index: delete_index as u64,
            });
        }
        ops.push(ResponseOp::Insert {
            index: to_index as u64,
            room_id: event.room_id.clone(),
            room: Some(room),
        });
        Ok(ops)
    }

    /// Full projections for a set of rooms at the current load position.
    async fn initial_room_data(
        &self,
        list_index: Option<usize>,
        room_ids: &[OwnedRoomId],
    ) -> Result<Vec<Room>> {
        let muxed = self
            .muxed_req
            .as_ref()
            .ok_or_else(|| Error::Internal("projection without a muxed request".to_string()))?;
        let timeline_limit = room_ids
            .first()
            .map(|room_id| muxed.timeline_limit(list_index, room_id))
            .unwrap_or_default();
        let mut datas = self
            .user_cache
            .lazily_load_room_datas(self.load_position, room_ids, timeline_limit as usize)
            .await;
        let mut rooms = Vec::with_capacity(room_ids.len());
        for room_id in room_ids {
            let user_data = datas.remove(room_id).unwrap_or_default();
            let mut metadata = self.global_cache.load_room(room_id).await?;
            metadata.remove_hero(&self.user_id);
            let required_state_map = muxed.required_state_map(list_index, room_id);
            let required_state = self
                .global_cache
                .load_room_state(room_id, self.load_position, &required_state_map)
                .await?;
            rooms.push(Room {
                room_id: room_id.clone(),
                name: Some(calculate_room_name(&metadata, 5)),
                required_state,
                timeline: user_data.timeline,
                notification_count: user_data.notification_count,
                highlight_count: user_data.highlight_count,
                initial: true,
                joined_count: metadata.joined_count,
                invited_count: metadata.invited_count,
                prev_batch: user_data.prev_batch,
            });
        }
        Ok(rooms)
    }

    /// The delta projection for one event: just the new event and the
    /// updated counters.
    async fn delta_room_data(&self, event: &EventData) -> Room {
        let user_data = self.user_cache.load_room_data(&event.room_id).await;
        let mut room = Room::stub(event.room_id.clone());
        room.notification_count = user_data.notification_count;
        room.highlight_count = user_data.highlight_count;
        if let Some(ev) = &event.event {
            room.timeline = vec![ev.clone()];
        }
        room
    }

    /// Tear the connection down. Idempotent; requests after this fail with
    /// connection-closed.
    pub async fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.inbox.cancel.cancel();
        self.user_cache.unsubscribe(self.user_cache_id).await;
        debug!(user_id = %self.user_id, "🧹 connection state destroyed");
    }
}

impl std::fmt::Debug for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnState")
            .field("user_id", &self.user_id)
            .field("rooms", &self.all_rooms.len())
            .field("lists", &self.lists.len())
            .field("load_position", &self.load_position)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}
