use async_trait::async_trait;
use serde_json::Value;

use wsmesh_core::error::Result;
use wsmesh_core::protocol::Envelope;

use crate::server::{PeerCtx, RequestHandler};

/// Answers a request with its own payload.
pub struct EchoHandler {
    name: String,
}

impl EchoHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl RequestHandler for EchoHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: PeerCtx, req: Envelope) -> Result<Option<Value>> {
        tracing::trace!(session = ctx.session_id(), name = %self.name, "echo");
        Ok(req.data)
    }
}
