use std::fmt;

/// Lifecycle state of a [`MeshClient`](super::MeshClient).
///
/// `Disconnected -> Connecting -> Connected -> Disconnected` on a drop
/// (followed by a backoff retry), or `-> Closing -> Disconnected` after
/// `close()`, which is terminal until the next `connect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
