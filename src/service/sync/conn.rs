// =============================================================================
// Slidesync Matrix Sliding Sync Server - Connection Module
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Connection tracking. Conn linearises concurrent requests for one
//   connection behind an async mutex and stamps responses with monotonic
//   position tokens. ConnMap owns the connections for the whole process.
//
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ruma::OwnedUserId;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connstate::ConnState;
use super::request::Request;
use super::response::Response;
use crate::cache::{GlobalCache, UserCache};
use crate::config::SyncConfig;
use crate::error::{Error, Result};

/// One client connection: the state machine plus the lock that linearises
/// requests against it.
pub struct Conn {
    /// Opaque connection identifier
    pub conn_id: String,

    state: Mutex<ConnState>,
    position: AtomicU64,
    cancel: CancellationToken,
}

impl Conn {
    pub fn new(state: ConnState) -> Arc<Self> {
        let cancel = state.cancellation_token();
        Arc::new(Self {
            conn_id: Uuid::new_v4().to_string(),
            state: Mutex::new(state),
            position: AtomicU64::new(0),
            cancel,
        })
    }

    /// The position the next response will be stamped with.
    pub fn current_position(&self) -> u64 {
        self.position.load(Ordering::SeqCst)
    }

    /// Handle one request. Concurrent calls for the same connection are
    /// serialised by the state lock. The work runs in its own task so a
    /// panicking comparator aborts this request, never the process.
    pub async fn on_incoming_request(self: &Arc<Self>, req: Request) -> Result<Response> {
        let conn = self.clone();
        let handle = tokio::spawn(async move {
            let txn_id = (!req.txn_id.is_empty()).then(|| req.txn_id.clone());
            let mut state = conn.state.lock().await;
            let mut response = state.handle_incoming_request(req).await?;
            let next = conn.position.fetch_add(1, Ordering::SeqCst) + 1;
            response.next = next.to_string();
            response.txn_id = txn_id;
            Ok(response)
        });
        match handle.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                warn!(conn_id = %self.conn_id, "💥 request aborted by panic");
                Err(Error::Internal("request aborted".to_string()))
            }
            Err(_) => Err(Error::ConnectionClosed),
        }
    }

    /// Tear the connection down. Idempotent.
    pub async fn destroy(&self) {
        self.cancel.cancel();
        self.state.lock().await.destroy().await;
    }
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("conn_id", &self.conn_id)
            .finish_non_exhaustive()
    }
}

/// All live connections, keyed by an opaque connection key chosen by the
/// transport.
#[derive(Debug, Default)]
pub struct ConnMap {
    conns: RwLock<HashMap<String, Arc<Conn>>>,
}

impl ConnMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.conns.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conns.read().await.is_empty()
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Conn>> {
        self.conns.read().await.get(key).cloned()
    }

    /// Create a fresh connection under this key, replacing (and destroying)
    /// any previous one.
    pub async fn create(
        &self,
        key: &str,
        user_id: OwnedUserId,
        user_cache: Arc<UserCache>,
        global_cache: Arc<GlobalCache>,
        config: SyncConfig,
    ) -> Arc<Conn> {
        let state = ConnState::new(user_id.clone(), user_cache, global_cache, config).await;
        let conn = Conn::new(state);
        let old = self
            .conns
            .write()
            .await
            .insert(key.to_string(), conn.clone());
        if let Some(old) = old {
            debug!(key, old_conn_id = %old.conn_id, "♻️ replacing existing connection");
            old.destroy().await;
        }
        info!(key, conn_id = %conn.conn_id, user_id = %user_id, "🔗 connection created");
        conn
    }

    /// Destroy and forget the connection under this key. Idempotent.
    pub async fn destroy(&self, key: &str) {
        let conn = self.conns.write().await.remove(key);
        if let Some(conn) = conn {
            conn.destroy().await;
            debug!(key, conn_id = %conn.conn_id, "🧹 connection destroyed");
        }
    }
}
