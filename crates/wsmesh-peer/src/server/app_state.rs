//! Shared peer state.
//!
//! Holds the server config, the request dispatcher, the live session
//! registry and the server-wide event router. Cloned into every session.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use wsmesh_core::error::Result;
use wsmesh_core::protocol::{encode, Envelope};

use crate::config::ServerConfig;
use crate::pubsub::Connection;

use super::dispatcher::{Dispatcher, RequestHandler};
use super::services::EchoHandler;
use super::session_registry::{try_queue, SessionRegistry};

#[derive(Clone)]
pub struct PeerState {
    inner: Arc<PeerStateInner>,
}

struct PeerStateInner {
    cfg: ServerConfig,
    dispatcher: Dispatcher,
    sessions: SessionRegistry,
    events: Connection<Envelope>,
}

impl PeerState {
    /// Build peer state with the built-in `echo` handler registered.
    pub fn new(cfg: ServerConfig) -> Result<Self> {
        cfg.validate()?;

        let dispatcher = Dispatcher::new();
        dispatcher.register(Arc::new(EchoHandler::new("echo")));

        Ok(Self {
            inner: Arc::new(PeerStateInner {
                cfg,
                dispatcher,
                sessions: SessionRegistry::new(),
                events: Connection::new(),
            }),
        })
    }

    pub fn cfg(&self) -> &ServerConfig {
        &self.inner.cfg
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn register(&self, handler: Arc<dyn RequestHandler>) {
        self.inner.dispatcher.register(handler);
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    /// `event`/`sys` envelopes received from any session, by name.
    pub fn events(&self) -> &Connection<Envelope> {
        &self.inner.events
    }

    /// Queue an envelope for one session. `NotConnected` if it is gone.
    pub fn send_to(&self, session_id: &str, env: &Envelope) -> Result<()> {
        self.inner.sessions.send_to(session_id, encode(env)?)
    }

    /// Send an `event` to every live session. Returns how many queued it.
    pub fn broadcast_event(&self, name: &str, data: Option<Value>) -> Result<usize> {
        let text = encode(&Envelope::event(name, data))?;
        Ok(self.inner.sessions.broadcast(&text))
    }
}

/// Per-request context handed to a `RequestHandler`.
#[derive(Clone)]
pub struct PeerCtx {
    session_id: Arc<str>,
    out: mpsc::Sender<String>,
    state: PeerState,
}

impl PeerCtx {
    pub(crate) fn new(session_id: &str, out: mpsc::Sender<String>, state: PeerState) -> Self {
        Self {
            session_id: Arc::from(session_id),
            out,
            state,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> &PeerState {
        &self.state
    }

    /// Queue an envelope for this session. Lossy when the queue is full.
    pub fn send(&self, env: &Envelope) -> Result<()> {
        try_queue(&self.out, encode(env)?)
    }

    pub fn send_event(&self, name: &str, data: Option<Value>) -> Result<()> {
        self.send(&Envelope::event(name, data))
    }
}
