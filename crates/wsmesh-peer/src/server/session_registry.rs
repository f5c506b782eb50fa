use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use wsmesh_core::error::{MeshError, Result};

struct SessionEntry {
    tx: mpsc::Sender<String>,
    opened_seq: u64,
}

/// Session registry: `session_id -> outbound queue`.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionEntry>,
    seq: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            seq: AtomicU64::new(1),
        }
    }

    pub fn insert(&self, session_id: String, tx: mpsc::Sender<String>) {
        let opened_seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.sessions.insert(session_id, SessionEntry { tx, opened_seq });
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Session ids, oldest first.
    pub fn ids(&self) -> Vec<String> {
        let mut all: Vec<(u64, String)> = self
            .sessions
            .iter()
            .map(|e| (e.value().opened_seq, e.key().clone()))
            .collect();
        all.sort();
        all.into_iter().map(|(_, id)| id).collect()
    }

    /// Queue `text` for one session. Never waits.
    pub fn send_to(&self, session_id: &str, text: String) -> Result<()> {
        let tx = self
            .sessions
            .get(session_id)
            .map(|e| e.value().tx.clone())
            .ok_or(MeshError::NotConnected)?;
        try_queue(&tx, text)
    }

    /// Lossy broadcast: sessions with a full queue miss this frame.
    /// Returns how many sessions accepted it.
    pub fn broadcast(&self, text: &str) -> usize {
        let targets: Vec<mpsc::Sender<String>> =
            self.sessions.iter().map(|e| e.value().tx.clone()).collect();
        targets
            .iter()
            .filter(|tx| try_queue(tx, text.to_string()).is_ok())
            .count()
    }
}

pub(crate) fn try_queue(tx: &mpsc::Sender<String>, text: String) -> Result<()> {
    tx.try_send(text).map_err(|e| match e {
        TrySendError::Full(_) => MeshError::Transport("session outbound queue full".into()),
        TrySendError::Closed(_) => MeshError::NotConnected,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn broadcast_skips_full_and_closed_queues() {
        let reg = SessionRegistry::new();
        let (a_tx, mut a_rx) = mpsc::channel(4);
        let (b_tx, _b_rx) = mpsc::channel(1);
        let (c_tx, c_rx) = mpsc::channel(4);
        reg.insert("a".into(), a_tx);
        reg.insert("b".into(), b_tx);
        reg.insert("c".into(), c_tx);
        drop(c_rx);

        reg.send_to("b", "fill".into()).unwrap();
        assert_eq!(reg.broadcast("hello"), 1);
        assert_eq!(a_rx.recv().await.unwrap(), "hello");
        assert_eq!(reg.ids(), vec!["a", "b", "c"]);

        assert!(reg.remove("c"));
        assert!(!reg.remove("c"));
        assert_eq!(reg.len(), 2);
    }
}
