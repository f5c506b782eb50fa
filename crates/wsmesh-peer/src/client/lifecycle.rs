//! Connection lifecycle task.
//!
//! One task per `connect()`. It exclusively owns the socket, the heartbeat
//! interval and the backoff sleep; everything it shares with the public API
//! lives in `ClientInner` behind locks, atomics or a watch channel.
//!
//! Loop:
//! 1. re-check the manual-close flag, then `Connecting`
//! 2. open the socket (bounded by `connect_timeout`, abortable by close)
//! 3. `Connected`: pump outbound queue, inbound frames and heartbeat
//! 4. on drop: `Disconnected`, sleep `backoff.delay(retry)`, goto 1

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

use wsmesh_core::backoff::Backoff;
use wsmesh_core::error::{MeshError, Result};
use wsmesh_core::protocol::{decode, encode, Envelope, MsgKind};

use crate::config::ClientConfig;
use crate::registry::CorrelationRegistry;
use crate::transport::{Connector, Socket, SocketEvent};

use super::state::ConnectionState;

/// Outbound queue depth per connection.
pub(crate) const OUTBOUND_QUEUE: usize = 1024;

/// Close code/reason handed from `close()` to the lifecycle task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRequest {
    pub code: u16,
    pub reason: String,
}

impl CloseRequest {
    fn client_dropped() -> Self {
        Self {
            code: 1001,
            reason: "client dropped".into(),
        }
    }
}

pub(crate) type CloseRx = watch::Receiver<Option<CloseRequest>>;

pub(crate) struct ClientInner {
    pub(crate) cfg: ClientConfig,
    pub(crate) backoff: Backoff,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) registry: CorrelationRegistry,
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) manual_close: AtomicBool,
    pub(crate) retries: AtomicU32,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
}

impl ClientInner {
    pub(crate) fn new(cfg: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            backoff: cfg.backoff.policy(),
            cfg,
            connector,
            registry: CorrelationRegistry::new(),
            state,
            manual_close: AtomicBool::new(false),
            retries: AtomicU32::new(0),
            outbound: Mutex::new(None),
        }
    }

    pub(crate) fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|cur| {
            if *cur == next {
                return false;
            }
            tracing::debug!(from = %cur, to = %next, "state");
            *cur = next;
            true
        });
    }

    pub(crate) fn outbound(&self) -> Option<mpsc::Sender<String>> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_outbound(&self, tx: Option<mpsc::Sender<String>>) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = tx;
    }

    fn closing(&self, close_rx: &CloseRx) -> bool {
        self.manual_close.load(Ordering::SeqCst)
            || close_rx.borrow().is_some()
            || close_rx.has_changed().is_err()
    }
}

enum Exit {
    /// `close()` was called (or the client handle dropped).
    Closed,
    /// Socket went away underneath us.
    Dropped(String),
}

pub(crate) async fn run(
    inner: Arc<ClientInner>,
    mut close_rx: CloseRx,
    ready: oneshot::Sender<Result<()>>,
) {
    let mut ready = Some(ready);

    loop {
        if inner.closing(&close_rx) {
            break;
        }
        inner.set_state(ConnectionState::Connecting);

        let attempt = tokio::select! {
            r = timeout(inner.cfg.connect_timeout(), inner.connector.connect(&inner.cfg.url)) => {
                r.unwrap_or_else(|_| Err(MeshError::Transport("connect timed out".into())))
            }
            _ = close_rx.changed() => break,
        };

        match attempt {
            Ok(mut socket) => {
                if inner.closing(&close_rx) {
                    let req = close_rx.borrow().clone().unwrap_or_else(CloseRequest::client_dropped);
                    let _ = socket.sink.close(req.code, &req.reason).await;
                    break;
                }

                inner.retries.store(0, Ordering::SeqCst);
                let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
                inner.set_outbound(Some(out_tx));
                inner.set_state(ConnectionState::Connected);
                tracing::info!("connected");
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Ok(()));
                }

                let exit = run_connected(&inner, socket, out_rx, &mut close_rx).await;
                inner.set_outbound(None);
                match exit {
                    Exit::Closed => break,
                    Exit::Dropped(reason) => tracing::warn!(%reason, "connection lost"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "connect attempt failed");
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(e));
                }
            }
        }

        inner.set_state(ConnectionState::Disconnected);
        if inner.closing(&close_rx) {
            break;
        }

        let retry = inner.retries.fetch_add(1, Ordering::SeqCst);
        let delay = inner.backoff.delay(retry);
        tracing::info!(retry, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = close_rx.changed() => break,
        }
    }

    inner.set_outbound(None);
    inner.set_state(ConnectionState::Disconnected);
    tracing::debug!("lifecycle task finished");
}

async fn run_connected(
    inner: &ClientInner,
    socket: Socket,
    mut out_rx: mpsc::Receiver<String>,
    close_rx: &mut CloseRx,
) -> Exit {
    let Socket {
        mut sink,
        mut events,
    } = socket;

    let every = inner.cfg.heartbeat_interval();
    let mut heartbeat = interval_at(Instant::now() + every, every);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = close_rx.changed() => {
                let req = close_rx.borrow().clone().unwrap_or_else(CloseRequest::client_dropped);
                if let Err(e) = sink.close(req.code, &req.reason).await {
                    tracing::debug!(error = %e, "close handshake failed");
                }
                tracing::info!(code = req.code, reason = %req.reason, "closed");
                return Exit::Closed;
            }

            // outbound writer
            maybe_out = out_rx.recv() => {
                let Some(text) = maybe_out else {
                    return Exit::Dropped("outbound queue closed".into());
                };
                if let Err(e) = sink.send_text(text).await {
                    return Exit::Dropped(e.to_string());
                }
            }

            // inbound reader
            incoming = events.next() => {
                match incoming {
                    Some(SocketEvent::Text(text)) => {
                        if let Some(reply) = route_inbound(inner, &text) {
                            if let Err(e) = sink.send_text(reply).await {
                                return Exit::Dropped(e.to_string());
                            }
                        }
                    }
                    Some(SocketEvent::Closed { code, reason }) => {
                        return Exit::Dropped(format!("closed by peer (code={code:?}, reason={reason})"));
                    }
                    Some(SocketEvent::Error(e)) => return Exit::Dropped(e),
                    None => return Exit::Dropped("stream ended".into()),
                }
            }

            _ = heartbeat.tick() => {
                match encode(&Envelope::ping()) {
                    Ok(text) => {
                        if let Err(e) = sink.send_text(text).await {
                            return Exit::Dropped(e.to_string());
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "ping encode failed"),
                }
            }
        }
    }
}

/// Decode and route one inbound frame. Returns a frame to write back, if any.
fn route_inbound(inner: &ClientInner, text: &str) -> Option<String> {
    let env = match decode(text) {
        Ok(env) => env,
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed frame");
            return None;
        }
    };
    if inner.cfg.enforce_version {
        if let Err(e) = env.check_version() {
            tracing::warn!(error = %e, "dropping envelope");
            return None;
        }
    }

    let kind = env.kind.clone();
    match &kind {
        MsgKind::Pong => None,
        MsgKind::Ping => match encode(&Envelope::pong()) {
            Ok(pong) => Some(pong),
            Err(e) => {
                tracing::error!(error = %e, "pong encode failed");
                None
            }
        },
        MsgKind::Res => {
            match env.correlation_id.clone() {
                Some(id) => {
                    inner.registry.resolve(&id, env);
                }
                None => tracing::debug!("res without id dropped"),
            }
            None
        }
        MsgKind::Event | MsgKind::Sys | MsgKind::Req => {
            match env.name.clone() {
                Some(name) => {
                    inner.registry.deliver(&name, env);
                }
                None => tracing::debug!(kind = %kind.as_str(), "unnamed envelope dropped"),
            }
            None
        }
        MsgKind::Unknown(t) => {
            tracing::debug!(kind = %t, "unknown envelope type dropped");
            None
        }
    }
}
