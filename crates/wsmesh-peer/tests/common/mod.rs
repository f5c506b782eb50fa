//! In-memory transport for lifecycle tests.
//!
//! Every successful `connect` hands the test a `ServerEnd` through the
//! channel returned by `MemoryConnector::new`; dropping it looks like an
//! abrupt socket loss to the client.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};

use wsmesh_core::error::{MeshError, Result};
use wsmesh_core::protocol::{decode, encode, Envelope, MsgKind};
use wsmesh_peer::client::ConnectionState;
use wsmesh_peer::config::ClientConfig;
use wsmesh_peer::transport::{Connector, FrameSink, Socket, SocketEvent};

pub const URL: &str = "ws://mesh.test/v1/ws";

/// What the client wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Text(String),
    Close { code: u16, reason: String },
}

pub struct ServerEnd {
    from_client: mpsc::UnboundedReceiver<ClientFrame>,
    to_client: mpsc::UnboundedSender<SocketEvent>,
}

impl ServerEnd {
    pub async fn next_frame(&mut self) -> Option<ClientFrame> {
        self.from_client.recv().await
    }

    pub fn try_frame(&mut self) -> Option<ClientFrame> {
        self.from_client.try_recv().ok()
    }

    /// Next envelope the client wrote, skipping heartbeat pings.
    pub async fn next_env(&mut self) -> Envelope {
        loop {
            match self.next_frame().await.expect("client went away") {
                ClientFrame::Text(text) => {
                    let env = decode(&text).expect("client wrote a bad envelope");
                    if env.kind != MsgKind::Ping {
                        return env;
                    }
                }
                other => panic!("expected a text frame, got {other:?}"),
            }
        }
    }

    pub fn send_env(&self, env: &Envelope) {
        self.send_raw(&encode(env).unwrap());
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.to_client.send(SocketEvent::Text(text.to_string()));
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(SocketEvent::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
    }
}

pub struct MemoryConnector {
    accepted: mpsc::UnboundedSender<ServerEnd>,
    fail_next: AtomicU32,
    attempts: AtomicU32,
}

impl MemoryConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accepted,
            fail_next: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
        });
        (connector, rx)
    }

    /// Refuse the next `n` attempts.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _url: &str) -> Result<Socket> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(MeshError::Transport("connection refused".into()));
        }

        let (client_tx, from_client) = mpsc::unbounded_channel();
        let (to_client, server_rx) = mpsc::unbounded_channel();
        self.accepted
            .send(ServerEnd {
                from_client,
                to_client,
            })
            .map_err(|_| MeshError::Transport("no acceptor".into()))?;

        let events = futures_util::stream::unfold(server_rx, |mut rx| async move {
            rx.recv().await.map(|ev| (ev, rx))
        })
        .boxed();

        Ok(Socket {
            sink: Box::new(MemorySink { tx: client_tx }),
            events,
        })
    }
}

struct MemorySink {
    tx: mpsc::UnboundedSender<ClientFrame>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.tx
            .send(ClientFrame::Text(text))
            .map_err(|_| MeshError::Transport("peer gone".into()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.tx
            .send(ClientFrame::Close {
                code,
                reason: reason.to_string(),
            })
            .map_err(|_| MeshError::Transport("peer gone".into()))
    }
}

pub fn config() -> ClientConfig {
    ClientConfig::with_url(URL)
}

pub async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, want: ConnectionState) {
    while *rx.borrow_and_update() != want {
        rx.changed().await.expect("client state sender dropped");
    }
}
