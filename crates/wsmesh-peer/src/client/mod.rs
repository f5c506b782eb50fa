//! Resilient WebSocket client.
//!
//! `MeshClient` multiplexes fire-and-forget events, correlated
//! request/response and heartbeat pings over one socket, and reconnects with
//! bounded jittered backoff until `close()` is called.
//!
//! Concurrency: the socket and timers belong to the lifecycle task; the
//! registry, outbound sender slot and state are shared behind locks so any
//! task can call into the client.

mod lifecycle;
mod state;

use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

use wsmesh_core::error::{MeshError, Result};
use wsmesh_core::protocol::{encode, new_id, Envelope, MsgKind};

use crate::config::ClientConfig;
use crate::pubsub::Subscription;
use crate::transport::{Connector, WsConnector};

use lifecycle::ClientInner;
pub use lifecycle::CloseRequest;
pub use state::ConnectionState;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

struct Driver {
    handle: JoinHandle<()>,
    close_tx: watch::Sender<Option<CloseRequest>>,
}

pub struct MeshClient {
    inner: Arc<ClientInner>,
    driver: Mutex<Option<Driver>>,
}

impl MeshClient {
    /// Build a client over any connector. Does not connect.
    pub fn new(cfg: ClientConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            inner: Arc::new(ClientInner::new(cfg, connector)),
            driver: Mutex::new(None),
        })
    }

    /// Build a client over tokio-tungstenite.
    pub fn websocket(cfg: ClientConfig) -> Result<Self> {
        Self::new(cfg, Arc::new(WsConnector))
    }

    /// Start the lifecycle task and wait for the first attempt.
    ///
    /// An `Err` here only reports the first attempt: the task keeps retrying
    /// in the background until `close()`. While the task is already running,
    /// this waits (at most `connect_timeout`) for the next attempt instead.
    pub async fn connect(&self) -> Result<()> {
        let mut driver = self.driver.lock().await;
        if let Some(d) = driver.as_ref() {
            if !d.handle.is_finished() {
                drop(driver);
                return self.wait_connected().await;
            }
        }

        self.inner.manual_close.store(false, Ordering::SeqCst);
        self.inner.retries.store(0, Ordering::SeqCst);

        let (close_tx, close_rx) = watch::channel(None);
        let (ready_tx, ready_rx) = oneshot::channel();
        let span = tracing::info_span!("mesh_client", url = %self.inner.cfg.url);
        let handle = tokio::spawn(
            lifecycle::run(Arc::clone(&self.inner), close_rx, ready_tx).instrument(span),
        );
        *driver = Some(Driver { handle, close_tx });
        drop(driver);

        ready_rx.await.unwrap_or(Err(MeshError::Closed))
    }

    /// Close with `code`/`reason` and stop reconnecting.
    ///
    /// Suspends until the lifecycle task has closed the socket and exited.
    /// Outstanding requests fail with `MeshError::Closed`.
    pub async fn close(&self, code: u16, reason: &str) -> Result<()> {
        self.inner.manual_close.store(true, Ordering::SeqCst);

        let driver = self.driver.lock().await.take();
        if let Some(d) = driver {
            if self.state() != ConnectionState::Disconnected {
                self.inner.set_state(ConnectionState::Closing);
            }
            let _ = d.close_tx.send(Some(CloseRequest {
                code,
                reason: reason.to_string(),
            }));
            if let Err(e) = d.handle.await {
                tracing::warn!(error = %e, "lifecycle task ended abnormally");
            }
        }

        let failed = self.inner.registry.fail_all(MeshError::Closed);
        if failed > 0 {
            tracing::debug!(failed, "pending requests failed on close");
        }
        self.inner.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Consecutive failed attempts since the last successful connect.
    pub fn retry_count(&self) -> u32 {
        self.inner.retries.load(Ordering::SeqCst)
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.registry.pending_len()
    }

    /// Fire-and-forget `event`. `NotConnected` when no socket is up;
    /// nothing is queued for later.
    pub async fn send_event(&self, name: &str, data: Option<Value>) -> Result<()> {
        self.send_envelope(&Envelope::event(name, data)).await
    }

    /// Fire-and-forget `sys`.
    pub async fn send_sys(&self, name: &str, data: Option<Value>) -> Result<()> {
        self.send_envelope(&Envelope::sys(name, data)).await
    }

    /// Send `req` and wait for the matching `res` or `request_timeout`.
    pub async fn request(&self, name: &str, data: Option<Value>) -> Result<Envelope> {
        let id = new_id();
        let env = Envelope::request(name, id.as_str(), data);
        let mut slot = self.inner.registry.register(&id, name);

        if let Err(e) = self.send_envelope(&env).await {
            self.inner.registry.cancel(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.inner.cfg.request_timeout(), &mut slot).await {
            Ok(done) => done.unwrap_or(Err(MeshError::Closed)),
            Err(_) => {
                // Whichever of expire/resolve removed the slot first has
                // already completed it.
                self.inner.registry.expire(&id);
                slot.await.unwrap_or(Err(MeshError::Closed))
            }
        }
    }

    /// Answer a `req` observed through `subscribe`.
    pub async fn respond(&self, req: &Envelope, data: Option<Value>) -> Result<()> {
        if req.kind != MsgKind::Req || req.correlation_id.is_none() {
            return Err(MeshError::Malformed(
                "respond needs a req envelope with an id".into(),
            ));
        }
        self.send_envelope(&Envelope::response_to(req, data)).await
    }

    /// Every envelope (`event`, `sys` or `req`) named `name`, in arrival order.
    pub fn subscribe(&self, name: &str) -> Subscription<Envelope> {
        self.inner.registry.subscribe(name)
    }

    /// Every named envelope, tagged with its name.
    pub fn on_any(&self) -> Subscription<(String, Envelope)> {
        self.inner.registry.subscribe_any()
    }

    /// Next envelope named `name`.
    pub fn once(&self, name: &str) -> impl Future<Output = Result<Envelope>> + Send + 'static {
        self.inner.registry.observers().once(name)
    }

    /// Resolve on `Connected`, or fail once an attempt made after this call
    /// has failed. `NotConnected` if neither happens within `connect_timeout`.
    async fn wait_connected(&self) -> Result<()> {
        let mut state = self.inner.state.subscribe();
        let failed_before = self.inner.retries.load(Ordering::SeqCst);

        let wait = async {
            loop {
                let cur = *state.borrow_and_update();
                if cur == ConnectionState::Connected {
                    return Ok(());
                }
                if cur == ConnectionState::Disconnected
                    && self.inner.retries.load(Ordering::SeqCst) > failed_before
                {
                    return Err(MeshError::Transport("connect attempt failed".into()));
                }
                if state.changed().await.is_err() {
                    return Err(MeshError::Closed);
                }
            }
        };

        tokio::time::timeout(self.inner.cfg.connect_timeout(), wait)
            .await
            .unwrap_or(Err(MeshError::NotConnected))
    }

    async fn send_envelope(&self, env: &Envelope) -> Result<()> {
        let text = encode(env)?;
        let tx = self.inner.outbound().ok_or(MeshError::NotConnected)?;
        tx.send(text).await.map_err(|_| MeshError::NotConnected)
    }
}

impl Drop for MeshClient {
    fn drop(&mut self) {
        self.inner.manual_close.store(true, Ordering::SeqCst);
        self.inner.registry.dispose();
    }
}
