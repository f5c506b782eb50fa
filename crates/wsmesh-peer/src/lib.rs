//! wsMesh peer: resilient WebSocket client, correlated request/response,
//! pub/sub routing, and a peer acceptor speaking the same envelope protocol.
//!
//! - [`client::MeshClient`]: connect, heartbeat, backoff reconnect, requests
//! - [`pubsub::Connection`]: name-keyed fan-out over an injected writer
//! - [`server`]: axum endpoint dispatching requests to `RequestHandler`s
//! - [`config`]: strict YAML config
//! - [`telemetry`]: tracing subscriber setup

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod client;
pub mod config;
pub mod pubsub;
pub mod registry;
pub mod server;
pub mod telemetry;
pub mod transport;

pub use client::{ConnectionState, MeshClient};
pub use pubsub::{Connection, Subscription};
