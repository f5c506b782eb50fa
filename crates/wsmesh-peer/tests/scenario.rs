//! End to end over a real socket: `MeshClient` + tokio-tungstenite against
//! the axum peer endpoint.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::timeout;

use wsmesh_core::error::{MeshError, Result};
use wsmesh_core::protocol::{Envelope, MsgKind};
use wsmesh_peer::client::{ConnectionState, MeshClient, CLOSE_NORMAL};
use wsmesh_peer::config::{ClientConfig, ServerConfig};
use wsmesh_peer::server::{self, services::EchoHandler, PeerCtx, PeerState, RequestHandler};

struct WhoAmI;

#[async_trait]
impl RequestHandler for WhoAmI {
    fn name(&self) -> &str {
        "whoami"
    }

    async fn handle(&self, ctx: PeerCtx, _req: Envelope) -> Result<Option<Value>> {
        ctx.send_event("hello", Some(json!("from server")))?;
        Ok(Some(json!({ "session": ctx.session_id() })))
    }
}

async fn start_peer() -> (PeerState, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = PeerState::new(ServerConfig::default()).unwrap();
    state.register(Arc::new(EchoHandler::new("ping-test")));
    state.register(Arc::new(WhoAmI));
    tokio::spawn(server::serve(listener, state.clone()));
    (state, format!("ws://{addr}{}", server::WS_PATH))
}

#[tokio::test]
async fn request_round_trip_over_websocket() {
    let (state, url) = start_peer().await;
    let client = MeshClient::websocket(ClientConfig::with_url(url)).unwrap();
    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    let res = client.request("ping-test", Some(json!({"x": 1}))).await.unwrap();
    assert_eq!(res.kind, MsgKind::Res);
    assert_eq!(res.data, Some(json!({"x": 1})));

    let res = client.request("echo", Some(json!([1, 2, 3]))).await.unwrap();
    assert_eq!(res.data, Some(json!([1, 2, 3])));

    let res = client.request("no.such.handler", None).await.unwrap();
    let data = res.data.unwrap();
    assert_eq!(data["error"]["code"], "NO_HANDLER");

    assert_eq!(state.sessions().len(), 1);
    client.close(CLOSE_NORMAL, "done").await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn events_flow_both_ways() {
    let (state, url) = start_peer().await;
    let mut chat = state.events().on_event("chat");

    let client = MeshClient::websocket(ClientConfig::with_url(url)).unwrap();
    client.connect().await.unwrap();
    let mut hello = client.subscribe("hello");
    let mut news = client.subscribe("news");

    let res = client.request("whoami", None).await.unwrap();
    let session = res.data.unwrap()["session"].as_str().unwrap().to_string();
    assert_eq!(state.sessions().ids(), vec![session.clone()]);
    let ev = timeout(Duration::from_secs(5), hello.recv()).await.unwrap().unwrap();
    assert_eq!(ev.data, Some(json!("from server")));

    client.send_event("chat", Some(json!({"text": "hi"}))).await.unwrap();
    let ev = timeout(Duration::from_secs(5), chat.recv()).await.unwrap().unwrap();
    assert_eq!(ev.kind, MsgKind::Event);
    assert_eq!(ev.data, Some(json!({"text": "hi"})));

    let mut direct = client.subscribe("direct");
    state
        .send_to(&session, &Envelope::event("direct", Some(json!("just you"))))
        .unwrap();
    let ev = timeout(Duration::from_secs(5), direct.recv()).await.unwrap().unwrap();
    assert_eq!(ev.data, Some(json!("just you")));
    assert!(matches!(
        state.send_to("no-such-session", &Envelope::event("direct", None)),
        Err(MeshError::NotConnected)
    ));

    assert_eq!(state.broadcast_event("news", Some(json!(42))).unwrap(), 1);
    let ev = timeout(Duration::from_secs(5), news.recv()).await.unwrap().unwrap();
    assert_eq!(ev.data, Some(json!(42)));

    client.close(CLOSE_NORMAL, "done").await.unwrap();
}
