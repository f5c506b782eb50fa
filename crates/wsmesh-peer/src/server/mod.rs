//! Peer acceptor (axum WebSocket endpoint).
//!
//! Speaks the same envelope protocol as `MeshClient`: heartbeat pings with an
//! idle timeout, `ping` -> `pong`, `req` dispatched by name to a
//! `RequestHandler` and answered with a `res`, `event`/`sys` delivered into a
//! server-wide pub/sub `Connection`.

mod app_state;
mod dispatcher;
pub mod services;
mod session;
mod session_registry;

use axum::{routing::get, Router};
use tokio::net::TcpListener;

use wsmesh_core::error::{MeshError, Result};

pub use app_state::{PeerCtx, PeerState};
pub use dispatcher::{Dispatcher, RequestHandler};
pub use session_registry::SessionRegistry;

/// WebSocket route.
pub const WS_PATH: &str = "/v1/ws";

pub fn build_router(state: PeerState) -> Router {
    Router::new()
        .route(WS_PATH, get(session::ws_upgrade))
        .with_state(state)
}

/// Serve until the listener fails.
pub async fn serve(listener: TcpListener, state: PeerState) -> Result<()> {
    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| MeshError::Transport(format!("server failed: {e}")))
}
