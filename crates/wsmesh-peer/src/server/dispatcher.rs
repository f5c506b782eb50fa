use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use wsmesh_core::error::{MeshError, Result};
use wsmesh_core::protocol::Envelope;

use super::app_state::PeerCtx;

/// Answers `req` envelopes with a given name. The returned value becomes the
/// `d` of the `res`.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, ctx: PeerCtx, req: Envelope) -> Result<Option<Value>>;
}

/// Request handler registry keyed by envelope name.
#[derive(Default)]
pub struct Dispatcher {
    handlers: DashMap<String, Arc<dyn RequestHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register (or replace) the handler for `handler.name()`.
    pub fn register(&self, handler: Arc<dyn RequestHandler>) {
        let name = handler.name().to_string();
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::warn!(%name, "request handler replaced");
        }
    }

    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub async fn dispatch(&self, ctx: PeerCtx, req: Envelope) -> Result<Option<Value>> {
        let handler = {
            let name = req.name.as_deref().unwrap_or_default();
            self.handlers
                .get(name)
                .ok_or_else(|| MeshError::NoHandler(name.to_string()))?
                .value()
                .clone()
        };
        handler.handle(ctx, req).await
    }
}
