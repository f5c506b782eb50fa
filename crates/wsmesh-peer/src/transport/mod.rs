//! Client-side transport seam.
//!
//! The lifecycle machine only talks to these traits, so the socket can be
//! tokio-tungstenite in production or an in-memory pair in tests. A
//! connected `Socket` is split into a writable text sink and a stream of
//! events that keeps graceful close and abrupt error apart.

pub mod ws;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use wsmesh_core::error::Result;

pub use ws::WsConnector;

/// What the read half can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Text(String),
    /// Peer closed the socket.
    Closed { code: Option<u16>, reason: String },
    /// Socket failed.
    Error(String),
}

pub type EventStream = BoxStream<'static, SocketEvent>;

/// Write half.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

pub struct Socket {
    pub sink: Box<dyn FrameSink>,
    pub events: EventStream,
}

/// Opens sockets. One call per connect attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Socket>;
}
