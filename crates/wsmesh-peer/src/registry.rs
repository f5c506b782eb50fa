//! Correlation registry: in-flight requests + per-name observers.
//!
//! - `pending`: correlation id -> completion slot. `resolve` and `expire`
//!   both remove the slot first, so whichever runs second is a no-op.
//! - `observers`: a [`Connection`] keyed by event name; delivery order is
//!   socket order.

use dashmap::DashMap;
use tokio::sync::oneshot;

use wsmesh_core::error::{MeshError, Result};
use wsmesh_core::protocol::Envelope;

use crate::pubsub::{Connection, Subscription};

/// Completion handle returned by `register`.
pub type Completion = oneshot::Receiver<Result<Envelope>>;

struct PendingRequest {
    name: String,
    tx: oneshot::Sender<Result<Envelope>>,
}

#[derive(Default)]
pub struct CorrelationRegistry {
    pending: DashMap<String, PendingRequest>,
    observers: Connection<Envelope>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending slot. `id` must not already be outstanding.
    pub fn register(&self, id: &str, name: &str) -> Completion {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id.to_string(),
            PendingRequest {
                name: name.to_string(),
                tx,
            },
        );
        rx
    }

    /// Complete the slot for `id` with `res`. Unknown/late ids are ignored.
    pub fn resolve(&self, id: &str, res: Envelope) -> bool {
        match self.pending.remove(id) {
            Some((_, p)) => {
                let _ = p.tx.send(Ok(res));
                true
            }
            None => {
                tracing::debug!(id, "response for unknown or expired request");
                false
            }
        }
    }

    /// Fail the slot for `id` with `Timeout` if it is still outstanding.
    pub fn expire(&self, id: &str) -> bool {
        match self.pending.remove(id) {
            Some((_, p)) => {
                tracing::debug!(id, name = %p.name, "request expired");
                let _ = p.tx.send(Err(MeshError::Timeout { name: p.name }));
                true
            }
            None => false,
        }
    }

    /// Drop the slot for `id` without completing it.
    pub fn cancel(&self, id: &str) {
        self.pending.remove(id);
    }

    /// Fail every outstanding request with `err`.
    pub fn fail_all(&self, err: MeshError) -> usize {
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, p)) = self.pending.remove(&id) {
                let _ = p.tx.send(Err(err.clone()));
                failed += 1;
            }
        }
        failed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn subscribe(&self, name: &str) -> Subscription<Envelope> {
        self.observers.on_event(name)
    }

    pub fn subscribe_any(&self) -> Subscription<(String, Envelope)> {
        self.observers.on_any()
    }

    pub fn observers(&self) -> &Connection<Envelope> {
        &self.observers
    }

    /// Fan out to `name` subscribers. Nobody listening means dropped.
    pub fn deliver(&self, name: &str, env: Envelope) -> usize {
        let n = self.observers.deliver(name, env);
        if n == 0 {
            tracing::trace!(name, "no observers; envelope dropped");
        }
        n
    }

    pub fn dispose(&self) {
        self.fail_all(MeshError::Closed);
        self.observers.dispose();
    }
}
