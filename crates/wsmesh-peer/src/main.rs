//! wsMesh peer daemon.
//!
//! Loads `wsmesh.yaml` (or the path in `WSMESH_CONFIG`), installs logging and
//! serves the peer endpoint at `/v1/ws`.

use std::net::SocketAddr;

use tokio::net::TcpListener;

use wsmesh_core::error::{MeshError, Result};
use wsmesh_peer::{config, server, telemetry::Telemetry};

const DEFAULT_CONFIG: &str = "wsmesh.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::var("WSMESH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let cfg = config::load_from_file(&path)?;

    let mut telemetry = Telemetry::new(&cfg.log)?;
    telemetry.install()?;

    let listen: SocketAddr = cfg
        .server
        .listen
        .parse()
        .map_err(|e| MeshError::BadConfig(format!("server.listen must be a SocketAddr: {e}")))?;

    let state = server::PeerState::new(cfg.server.clone())?;
    tracing::info!(%listen, handlers = ?state.dispatcher().registered(), "wsmesh-peer starting");

    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| MeshError::Transport(format!("bind {listen} failed: {e}")))?;

    let result = server::serve(listener, state).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "server stopped");
    }
    telemetry.shutdown();
    result
}
