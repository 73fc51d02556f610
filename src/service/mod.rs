// =============================================================================
// Slidesync Matrix Sliding Sync Server - Service Module
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Business logic services. The sync service hosts the per-connection
//   list-projection engine.
//
// =============================================================================

pub mod sync;
