//! tcp-inbox: a thread-per-connection TCP listener
//!
//! Every accepted connection gets its own thread, which reads once,
//! optionally answers once, and closes. Two protocols are supported:
//! - `plain`: log the received text
//! - `http`: extract the request body and reply `200 OK`
//!
//! Configuration via CLI arguments or TOML file.

mod config;
mod connection;
mod protocols;
mod server;
mod signal;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        protocol = ?config.protocol,
        buffer_size = config.buffer_size,
        backlog = config.backlog,
        max_connections = config.max_connections,
        "Starting tcp-inbox server"
    );

    let server = Server::bind(config)?;
    signal::spawn_interrupt_listener(server.shutdown_handle())?;
    server.run()?;

    Ok(())
}
