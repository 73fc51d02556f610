// =============================================================================
// Slidesync Matrix Sliding Sync Server - Main Entry Point
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Binary entry point: CLI parsing, structured logging and the HTTP
//   server loop.
//
// =============================================================================

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use slidesync::api;
use slidesync::SyncConfig;

/// Ultra high performance Matrix sliding sync server
#[derive(Debug, Parser)]
#[command(name = "slidesync", version, about)]
struct Args {
    /// Listen address
    #[arg(long, env = "SLIDESYNC_ADDRESS", default_value = "0.0.0.0")]
    address: IpAddr,

    /// Listen port
    #[arg(long, env = "SLIDESYNC_PORT", default_value_t = 8008)]
    port: u16,

    /// Log filter, e.g. "info" or "slidesync=debug"
    #[arg(long, env = "SLIDESYNC_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let start_time = Instant::now();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&args.log).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🚀 Starting Slidesync Matrix Sliding Sync Server");

    let config = SyncConfig {
        address: args.address,
        port: args.port,
        ..Default::default()
    };
    let addr = SocketAddr::new(config.address, config.port);
    let server = api::SyncServer::new(config);
    let app = api::router(server);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("❌ Failed to bind {}: {}", addr, err);
            std::process::exit(1);
        }
    };
    info!(
        "✅ Listening on {} (startup took {:?})",
        addr,
        start_time.elapsed()
    );

    if let Err(err) = axum::serve(listener, app).await {
        error!("❌ Server error: {}", err);
        std::process::exit(1);
    }
}
