//! Logging handle.
//!
//! A `Telemetry` is built from `LogConfig` and owns its own `Dispatch`.
//! Binaries call `install` once; tests and embedders can `scoped` it to the
//! current thread instead. `shutdown` consumes the handle.

use tracing::dispatcher::{self, DefaultGuard, Dispatch};
use tracing_subscriber::{fmt, EnvFilter};

use wsmesh_core::error::{MeshError, Result};

use crate::config::LogConfig;

pub struct Telemetry {
    dispatch: Dispatch,
    installed: bool,
}

impl Telemetry {
    pub fn new(cfg: &LogConfig) -> Result<Self> {
        let filter = EnvFilter::try_new(&cfg.filter)
            .map_err(|e| MeshError::BadConfig(format!("log.filter invalid: {e}")))?;
        let subscriber = fmt()
            .with_env_filter(filter)
            .with_ansi(cfg.ansi)
            .with_target(true)
            .finish();
        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            installed: false,
        })
    }

    /// Install as the process-wide default. Fails if something else got there first.
    pub fn install(&mut self) -> Result<()> {
        dispatcher::set_global_default(self.dispatch.clone())
            .map_err(|e| MeshError::Internal(format!("telemetry install failed: {e}")))?;
        self.installed = true;
        Ok(())
    }

    /// Route events on the current thread here until the guard drops.
    pub fn scoped(&self) -> DefaultGuard {
        dispatcher::set_default(&self.dispatch)
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn shutdown(self) {
        dispatcher::with_default(&self.dispatch, || {
            tracing::info!(global = self.installed, "telemetry shutdown");
        });
    }
}
