// =============================================================================
// Slidesync Matrix Sliding Sync Server - Cache Module
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   The shared caches the per-connection engine reads: server-wide room
//   metadata/state and per-user room data, written by the upstream poller.
//
// =============================================================================

pub mod global;
pub mod types;
pub mod user;

pub use global::GlobalCache;
pub use types::{calculate_room_name, EventData, Hero, RoomMetadata, UserRoomData};
pub use user::{UserCache, UserCacheListener};
