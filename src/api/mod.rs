// =============================================================================
// Slidesync Matrix Sliding Sync Server - API Module
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   HTTP surface of the server: shared state, router construction and the
//   sliding sync endpoint.
//
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::{routing::post, Router};
use ruma::{OwnedUserId, UserId};
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::cache::{GlobalCache, UserCache};
use crate::config::SyncConfig;
use crate::service::sync::ConnMap;

pub mod sync;

/// Shared server state: the caches fed by the upstream poller and the live
/// connection map.
#[derive(Debug)]
pub struct SyncServer {
    pub config: SyncConfig,
    pub global_cache: Arc<GlobalCache>,
    pub conns: ConnMap,
    user_caches: RwLock<HashMap<OwnedUserId, Arc<UserCache>>>,
}

impl SyncServer {
    pub fn new(config: SyncConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            global_cache: GlobalCache::new(),
            conns: ConnMap::new(),
            user_caches: RwLock::new(HashMap::new()),
        })
    }

    /// The per-user cache, created on first use.
    pub async fn user_cache(&self, user_id: &UserId) -> Arc<UserCache> {
        if let Some(cache) = self.user_caches.read().await.get(user_id) {
            return cache.clone();
        }
        let mut caches = self.user_caches.write().await;
        caches
            .entry(user_id.to_owned())
            .or_insert_with(|| UserCache::new(user_id.to_owned(), self.global_cache.clone()))
            .clone()
    }
}

/// Build the HTTP router.
pub fn router(server: Arc<SyncServer>) -> Router {
    Router::new()
        .route(
            "/_matrix/client/unstable/org.matrix.msc3575/sync",
            post(sync::handle_sync),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(server)
}
