//! Turnstone Session Server
//!
//! Authoritative pairing and turn arbitration server.
//! Accepts WebSocket connections, pairs participants by time control, and
//! arbitrates every action against server-held state and clocks.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use turnstone::{
    core::rng::SessionRng,
    game::rules::FreePlay,
    network::coordinator::Coordinator,
    network::server::{ServerConfig, SessionServer},
    VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();

    info!("Turnstone Server v{}", VERSION);
    info!("Bind address: {}", config.bind_addr);
    info!("Max connections: {}", config.max_connections);

    let coordinator = Arc::new(Coordinator::new(
        Arc::new(FreePlay),
        SessionRng::from_entropy(),
    ));
    let server = Arc::new(SessionServer::new(config, Arc::clone(&coordinator)));

    // Shut down cleanly on Ctrl+C
    {
        let coordinator = Arc::clone(&coordinator);
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received, shutting down");
                coordinator.broadcast_shutdown("server shutting down").await;
                server.shutdown();
            }
        });
    }

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Server stopped");
    Ok(())
}
