// =============================================================================
// Slidesync Matrix Sliding Sync Server - Sync Service Module
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   The sliding window sync engine: request algebra, window geometry,
//   sortable room lists and the per-connection state machine that turns
//   room movements into minimal client operation streams.
//
// =============================================================================

pub mod conn;
pub mod connstate;
pub mod ranges;
pub mod request;
pub mod response;
pub mod sortable;

pub use conn::{Conn, ConnMap};
pub use connstate::ConnState;
pub use ranges::{RangeDelta, SliceRanges};
pub use request::{
    apply_delta, Request, RequestDelta, RequestFilters, RequestList, RequestListDelta,
    RequiredStateMap, RoomSubscription, DEFAULT_TIMELINE_LIMIT, DEFAULT_TIMEOUT_MSECS,
};
pub use response::{Response, ResponseList, ResponseOp, Room};
pub use sortable::{RoomConnMetadata, SortKey, SortableRooms};
