//! Per-connection session loop.
//!
//! - outbound writer (queue fed by handlers, broadcasts and replies)
//! - inbound reader: decode, version check, route by kind
//! - heartbeat `ping` envelope every `ping_interval_ms`
//! - idle timeout: no inbound frame for `idle_timeout_ms` ends the session

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep_until, Duration, Instant, MissedTickBehavior};
use tracing::Instrument;

use wsmesh_core::error::MeshError;
use wsmesh_core::protocol::{decode, encode, new_id, Envelope, MsgKind};

use super::app_state::{PeerCtx, PeerState};

const OUTBOUND_QUEUE: usize = 1024;

/// `d` of a `res` whose handler failed.
pub(crate) fn error_payload(e: &MeshError) -> Value {
    json!({
        "error": {
            "code": e.code().as_str(),
            "msg": e.to_string(),
        }
    })
}

pub async fn ws_upgrade(State(state): State<PeerState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| {
        let session_id = new_id();
        let span = tracing::info_span!("peer_session", session = %session_id);
        run_session(state, session_id, socket).instrument(span)
    })
}

async fn run_session(state: PeerState, session_id: String, socket: WebSocket) {
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let (mut ws_tx, mut ws_rx) = socket.split();

    state.sessions().insert(session_id.clone(), out_tx.clone());
    let ctx = PeerCtx::new(&session_id, out_tx, state.clone());
    tracing::info!("session opened");

    let cfg = state.cfg();
    let ping_every = Duration::from_millis(cfg.ping_interval_ms);
    let idle_timeout = Duration::from_millis(cfg.idle_timeout_ms);
    let max_frame_bytes = cfg.max_frame_bytes;

    let mut ping_tick = interval_at(Instant::now() + ping_every, ping_every);
    ping_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    let reason = loop {
        tokio::select! {
            maybe_out = out_rx.recv() => {
                let Some(text) = maybe_out else { break "outbound closed" };
                if ws_tx.send(Message::Text(text)).await.is_err() {
                    break "write failed";
                }
            }

            incoming = ws_rx.next() => {
                let Some(Ok(msg)) = incoming else { break "socket closed" };
                last_activity = Instant::now();

                match msg {
                    Message::Text(text) => {
                        if text.len() > max_frame_bytes {
                            tracing::warn!(len = text.len(), max_frame_bytes, "oversized frame dropped");
                            continue;
                        }
                        handle_text(&ctx, &text);
                    }
                    Message::Binary(b) => tracing::debug!(len = b.len(), "binary frame dropped"),
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(_) => break "closed by peer",
                }
            }

            _ = ping_tick.tick() => {
                match encode(&Envelope::ping()) {
                    Ok(text) => {
                        if ws_tx.send(Message::Text(text)).await.is_err() {
                            break "write failed";
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "ping encode failed"),
                }
            }

            _ = sleep_until(last_activity + idle_timeout) => break "idle timeout",
        }
    };

    state.sessions().remove(&session_id);
    let _ = ws_tx.close().await;
    tracing::info!(reason, "session closed");
}

fn handle_text(ctx: &PeerCtx, text: &str) {
    let env = match decode(text) {
        Ok(env) => env,
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed frame");
            return;
        }
    };
    if let Err(e) = env.check_version() {
        tracing::warn!(error = %e, "dropping envelope");
        return;
    }

    let kind = env.kind.clone();
    match kind {
        MsgKind::Ping => {
            if let Err(e) = ctx.send(&Envelope::pong()) {
                tracing::debug!(error = %e, "pong not queued");
            }
        }
        MsgKind::Pong => {}
        MsgKind::Req => {
            if env.correlation_id.is_none() {
                tracing::debug!("req without id dropped");
                return;
            }
            tokio::spawn(answer(ctx.clone(), env).in_current_span());
        }
        MsgKind::Event | MsgKind::Sys => match env.name.clone() {
            Some(name) => {
                ctx.state().events().deliver(&name, env);
            }
            None => tracing::debug!("unnamed envelope dropped"),
        },
        MsgKind::Res => tracing::debug!("unsolicited res dropped"),
        MsgKind::Unknown(t) => tracing::debug!(kind = %t, "unknown envelope type dropped"),
    }
}

async fn answer(ctx: PeerCtx, req: Envelope) {
    let data = match ctx.state().dispatcher().dispatch(ctx.clone(), req.clone()).await {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(name = ?req.name, error = %e, "request failed");
            Some(error_payload(&e))
        }
    };
    if let Err(e) = ctx.send(&Envelope::response_to(&req, data)) {
        tracing::debug!(error = %e, "response not queued");
    }
}
