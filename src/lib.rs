// =============================================================================
// Slidesync Matrix Sliding Sync Server - Library Crate
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   A stateful sliding-window synchronization server. Projects a user's
//   large room collection onto small client-tracked windows, delivering
//   compact delta operations (SYNC, INVALIDATE, INSERT, DELETE, UPDATE)
//   that keep each window consistent with the server-side sorted room list
//   as rooms mutate.
//
// =============================================================================

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod service;

pub use config::SyncConfig;
pub use error::{Error, Result};

// Re-export common types
pub use ruma;
pub use tokio;
pub use tracing;
