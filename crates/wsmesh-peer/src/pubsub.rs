//! Transport-agnostic pub/sub router.
//!
//! `Connection<T>` fans payloads out by event name to any number of
//! subscribers, plus an "any" channel that sees every `(name, payload)`
//! pair. Outbound frames go through an injected writer so the same router
//! works over a WebSocket, a pipe, or a test harness.
//!
//! Frame format for `send` / `deliver_frame`:
//! `{"event": "<name>", "payload": <T>}`.
//!
//! Subscribers are unbounded channels: delivery never blocks the caller and
//! never drops for a live subscriber. Dropped subscriptions are pruned on the
//! next delivery to their name.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures_util::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use wsmesh_core::error::{MeshError, Result};

/// Raw frame writer bound by the owning transport.
pub type Writer = Arc<dyn Fn(String) -> Result<()> + Send + Sync>;

/// Receiving end of a subscription. Yields `None` once the router is disposed.
///
/// The queue behind it is unbounded: a subscription that is kept but never
/// read keeps every delivery in memory. Drop it once you stop reading.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking poll; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

#[derive(Serialize)]
struct OutFrame<'a, T> {
    event: &'a str,
    payload: &'a T,
}

#[derive(Deserialize)]
struct InFrame<T> {
    event: String,
    payload: T,
}

pub struct Connection<T> {
    named: DashMap<String, Vec<mpsc::UnboundedSender<T>>>,
    any: Mutex<Vec<mpsc::UnboundedSender<(String, T)>>>,
    writer: RwLock<Option<Writer>>,
    disposed: AtomicBool,
}

impl<T> Default for Connection<T> {
    fn default() -> Self {
        Self {
            named: DashMap::new(),
            any: Mutex::new(Vec::new()),
            writer: RwLock::new(None),
            disposed: AtomicBool::new(false),
        }
    }
}

impl<T: Clone + Send + 'static> Connection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the function used to emit encoded frames.
    pub fn attach_sender<F>(&self, writer: F)
    where
        F: Fn(String) -> Result<()> + Send + Sync + 'static,
    {
        *self.writer.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(writer));
    }

    pub fn detach_sender(&self) {
        *self.writer.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn on_event(&self, name: &str) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.disposed.load(Ordering::Acquire) {
            self.named.entry(name.to_string()).or_insert_with(Vec::new).push(tx);
        }
        Subscription { rx }
    }

    pub fn on_any(&self) -> Subscription<(String, T)> {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.disposed.load(Ordering::Acquire) {
            lock(&self.any).push(tx);
        }
        Subscription { rx }
    }

    /// Resolve with the next payload for `name`, then unsubscribe.
    ///
    /// The subscription is taken before this returns, so a delivery that
    /// races with the first poll is not missed.
    pub fn once(&self, name: &str) -> impl Future<Output = Result<T>> + Send + 'static {
        let mut sub = self.on_event(name);
        async move { sub.recv().await.ok_or(MeshError::Closed) }
    }

    /// Fan `payload` out to `name` subscribers, then to "any" subscribers.
    /// Returns how many subscribers received it.
    pub fn deliver(&self, name: &str, payload: T) -> usize {
        let mut delivered = 0;
        if let Some(mut subs) = self.named.get_mut(name) {
            subs.retain(|tx| tx.send(payload.clone()).is_ok());
            delivered += subs.len();
        }
        let mut any = lock(&self.any);
        any.retain(|tx| tx.send((name.to_string(), payload.clone())).is_ok());
        delivered += any.len();
        delivered
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.named
            .get(name)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Close every channel and drop the writer. Do not use the router afterwards.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.named.clear();
        lock(&self.any).clear();
        self.detach_sender();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl<T: Clone + Send + Serialize + 'static> Connection<T> {
    /// Encode `{event, payload}` and hand it to the attached writer.
    pub fn send(&self, name: &str, payload: &T) -> Result<()> {
        let writer = self
            .writer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(MeshError::NotConnected)?;
        let frame = serde_json::to_string(&OutFrame {
            event: name,
            payload,
        })
        .map_err(|e| MeshError::Internal(format!("event encode failed: {e}")))?;
        writer(frame)
    }
}

impl<T: Clone + Send + DeserializeOwned + 'static> Connection<T> {
    /// Decode an inbound `{event, payload}` frame and deliver it.
    pub fn deliver_frame(&self, text: &str) -> Result<usize> {
        let frame: InFrame<T> = serde_json::from_str(text)
            .map_err(|e| MeshError::Malformed(format!("invalid event frame: {e}")))?;
        Ok(self.deliver(&frame.event, frame.payload))
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
