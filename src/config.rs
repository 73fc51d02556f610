// =============================================================================
// Slidesync Matrix Sliding Sync Server - Configuration Module
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Server configuration. Tunables for the per-connection engine (inbox
//   capacity, live loop timeout) live here so deployments can trade memory
//   for connection survivability.
//
// =============================================================================

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the sliding sync server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Listen address
    pub address: IpAddr,

    /// Listen port
    pub port: u16,

    /// How long a request with nothing to report blocks before returning an
    /// empty response, in milliseconds
    pub default_timeout_ms: u64,

    /// The max number of events the client is eligible to read (unfiltered)
    /// which we are willing to buffer on a connection. Too large and we
    /// consume lots of memory. Too small and busy accounts will trip the
    /// connection knifing.
    pub max_pending_event_updates: usize,

    /// How long an inbox send may block before the connection is considered
    /// dead, in seconds
    pub event_buffer_timeout_secs: u64,

    /// Timeline events per room when the request doesn't say otherwise
    pub default_timeline_limit: u64,

    /// Upper bound on client-requested timeline limits
    pub max_timeline_limit: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8008,
            default_timeout_ms: 10_000,
            max_pending_event_updates: 200,
            event_buffer_timeout_secs: 5,
            default_timeline_limit: 20,
            max_timeline_limit: 50,
        }
    }
}

impl SyncConfig {
    /// Live loop timeout as a [`Duration`]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Inbox send timeout as a [`Duration`]
    pub fn event_buffer_timeout(&self) -> Duration {
        Duration::from_secs(self.event_buffer_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.port, 8008);
        assert_eq!(config.default_timeout_ms, 10_000);
        assert_eq!(config.max_pending_event_updates, 200);
        assert_eq!(config.event_buffer_timeout(), Duration::from_secs(5));
        assert_eq!(config.default_timeline_limit, 20);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = SyncConfig::default();
        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: SyncConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(config.port, deserialized.port);
        assert_eq!(config.default_timeout_ms, deserialized.default_timeout_ms);
    }
}
