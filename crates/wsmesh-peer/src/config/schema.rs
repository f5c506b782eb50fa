use std::time::Duration;

use serde::Deserialize;
use wsmesh_core::backoff::Backoff;
use wsmesh_core::error::{MeshError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeshConfig {
    pub version: u32,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl MeshConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MeshError::BadConfig(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.client.validate()?;
        self.server.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Drop inbound envelopes whose `v` differs from ours.
    #[serde(default = "default_true")]
    pub enforce_version: bool,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            enforce_version: true,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults pointed at `url`.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(MeshError::BadConfig(
                "client.url must start with ws:// or wss://".into(),
            ));
        }
        if !(1_000..=300_000).contains(&self.heartbeat_interval_ms) {
            return Err(MeshError::BadConfig(
                "client.heartbeat_interval_ms must be between 1000 and 300000".into(),
            ));
        }
        if !(100..=300_000).contains(&self.request_timeout_ms) {
            return Err(MeshError::BadConfig(
                "client.request_timeout_ms must be between 100 and 300000".into(),
            ));
        }
        if !(100..=300_000).contains(&self.connect_timeout_ms) {
            return Err(MeshError::BadConfig(
                "client.connect_timeout_ms must be between 100 and 300000".into(),
            ));
        }
        self.backoff.validate()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_base_ms")]
    pub base_ms: u64,

    #[serde(default = "default_backoff_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: default_backoff_base_ms(),
            jitter_ms: default_backoff_jitter_ms(),
            max_ms: default_backoff_max_ms(),
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_ms == 0 {
            return Err(MeshError::BadConfig("client.backoff.base_ms must be > 0".into()));
        }
        if self.max_ms < self.base_ms {
            return Err(MeshError::BadConfig(
                "client.backoff.max_ms must be >= base_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.base_ms),
            Duration::from_millis(self.jitter_ms),
            Duration::from_millis(self.max_ms),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_heartbeat_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1_000..=300_000).contains(&self.ping_interval_ms) {
            return Err(MeshError::BadConfig(
                "server.ping_interval_ms must be between 1000 and 300000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(MeshError::BadConfig(
                "server.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(MeshError::BadConfig("server.max_frame_bytes must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info,wsmesh_peer=debug`.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    #[serde(default = "default_true")]
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            ansi: true,
        }
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:8080/v1/ws".into()
}
fn default_heartbeat_interval_ms() -> u64 {
    15_000
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_true() -> bool {
    true
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_jitter_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    20_000
}
fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_idle_timeout_ms() -> u64 {
    60_000
}
fn default_max_frame_bytes() -> usize {
    65_536
}
fn default_log_filter() -> String {
    "info".into()
}
