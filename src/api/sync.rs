// =============================================================================
// Slidesync Matrix Sliding Sync Server - Sync API Module
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   HTTP handler for the sliding sync endpoint. Resolves the requesting
//   user, attaches the transport-level position and timeout to the request
//   and dispatches it to the connection.
//
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use ruma::{OwnedUserId, UserId};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::SyncServer;
use crate::error::{Error, Result};
use crate::service::sync::{Request, Response};

/// Transport-level query parameters
#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    /// Connection position from the previous response; absence means a
    /// fresh stream
    pub since: Option<String>,

    /// Long-poll timeout in milliseconds
    pub timeout: Option<u64>,

    /// Distinguishes multiple connections from the same user
    pub conn_id: Option<String>,
}

/// POST /_matrix/client/unstable/org.matrix.msc3575/sync
#[instrument(level = "debug", skip_all)]
pub async fn handle_sync(
    State(server): State<Arc<SyncServer>>,
    Query(params): Query<SyncParams>,
    headers: HeaderMap,
    Json(mut body): Json<Request>,
) -> Result<Json<Response>> {
    let user_id = authenticate(&headers)?;
    let conn_key = format!(
        "{}/{}",
        user_id,
        params.conn_id.as_deref().unwrap_or("default")
    );

    if let Some(timeout) = params.timeout {
        body.set_timeout_msecs(timeout);
    }

    let conn = match &params.since {
        // an existing stream must resolve to a live connection; a stale
        // position means the connection was knifed and the client restarts
        Some(since) => {
            let pos = since.parse::<u64>().map_err(|_| {
                Error::BadRequest(format!("invalid since token: {since}"))
            })?;
            body.set_pos(pos);
            server
                .conns
                .get(&conn_key)
                .await
                .ok_or(Error::ConnectionClosed)?
        }
        None => {
            let user_cache = server.user_cache(&user_id).await;
            server
                .conns
                .create(
                    &conn_key,
                    user_id.clone(),
                    user_cache,
                    server.global_cache.clone(),
                    server.config.clone(),
                )
                .await
        }
    };

    debug!(user_id = %user_id, conn_id = %conn.conn_id, "🔄 sync request dispatched");
    let response = conn.on_incoming_request(body).await;
    if matches!(response, Err(Error::ConnectionClosed | Error::BufferExceeded)) {
        server.conns.destroy(&conn_key).await;
    }
    response.map(Json)
}

/// Resolve the requesting user from the bearer token. Real authentication
/// is the host process's concern; the token names the user directly.
fn authenticate(headers: &HeaderMap) -> Result<OwnedUserId> {
    let token = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| Error::BadRequest("missing bearer token".to_string()))?;
    UserId::parse(token)
        .map_err(|_| Error::BadRequest(format!("token does not name a valid user: {token}")))
}
