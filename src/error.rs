// =============================================================================
// Slidesync Matrix Sliding Sync Server - Error Module
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Error types for the sliding sync server. All errors are designed to be
//   user-friendly and provide clear context about what went wrong, and each
//   variant maps onto a well-defined HTTP status at the transport boundary.
//
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Slidesync error types
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed client request: bad sort key, overlapping ranges, negative bounds
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Operation on a destroyed connection
    #[error("Connection is closed")]
    ConnectionClosed,

    /// The event inbox could not accept an update in time
    #[error("Event buffer exceeded for connection")]
    BufferExceeded,

    /// Transient failure in the global or user cache
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Extension-specific signal: data was produced for an extension the
    /// client never enabled. Invisible to the core.
    #[error("Extension not requested: {0}")]
    NotRequested(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for slidesync operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Matrix error code reported on the wire
    pub fn errcode(&self) -> &'static str {
        match self {
            Error::BadRequest(_) => "M_INVALID_PARAM",
            Error::ConnectionClosed => "M_NOT_FOUND",
            Error::BufferExceeded => "M_NOT_FOUND",
            Error::UpstreamUnavailable(_) => "M_UNAVAILABLE",
            Error::NotRequested(_) => "M_INVALID_PARAM",
            _ => "M_UNKNOWN",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) | Error::NotRequested(_) => StatusCode::BAD_REQUEST,
            // the transport treats a dead connection as an unknown resource so
            // clients restart from a fresh stream
            Error::ConnectionClosed | Error::BufferExceeded => StatusCode::NOT_FOUND,
            Error::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({
            "errcode": self.errcode(),
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::BadRequest("overlapping ranges".to_string());
        assert_eq!(err.to_string(), "Bad request: overlapping ranges");

        let err = Error::ConnectionClosed;
        assert_eq!(err.to_string(), "Connection is closed");

        let err = Error::UpstreamUnavailable("cache load failed".to_string());
        assert_eq!(err.to_string(), "Upstream unavailable: cache load failed");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::ConnectionClosed.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::UpstreamUnavailable("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_errcode_mapping() {
        assert_eq!(Error::BadRequest("x".into()).errcode(), "M_INVALID_PARAM");
        assert_eq!(Error::ConnectionClosed.errcode(), "M_NOT_FOUND");
        assert_eq!(Error::Internal("x".into()).errcode(), "M_UNKNOWN");
    }
}
