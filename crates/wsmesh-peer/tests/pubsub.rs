#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use serde_json::{json, Value};

use wsmesh_core::error::MeshError;
use wsmesh_peer::pubsub::Connection;

fn captured(conn: &Connection<Value>) -> Arc<Mutex<Vec<String>>> {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&frames);
    conn.attach_sender(move |frame| {
        sink.lock().unwrap().push(frame);
        Ok(())
    });
    frames
}

#[test]
fn send_without_writer_is_not_connected() {
    let conn: Connection<Value> = Connection::new();
    assert!(matches!(
        conn.send("chat", &json!("hi")),
        Err(MeshError::NotConnected)
    ));
}

#[test]
fn send_encodes_event_frame() {
    let conn: Connection<Value> = Connection::new();
    let frames = captured(&conn);

    conn.send("chat", &json!({"text": "hi"})).unwrap();

    let frames = frames.lock().unwrap();
    assert_eq!(frames.len(), 1);
    let v: Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(v, json!({"event": "chat", "payload": {"text": "hi"}}));
}

#[test]
fn detach_stops_writes() {
    let conn: Connection<Value> = Connection::new();
    let frames = captured(&conn);
    conn.detach_sender();
    assert!(conn.send("chat", &json!(1)).is_err());
    assert!(frames.lock().unwrap().is_empty());
}

#[test]
fn writer_errors_propagate() {
    let conn: Connection<Value> = Connection::new();
    conn.attach_sender(|_| Err(MeshError::Transport("pipe closed".into())));
    assert!(matches!(
        conn.send("chat", &json!(1)),
        Err(MeshError::Transport(_))
    ));
}

#[tokio::test]
async fn deliver_frame_routes_by_event_name() {
    let conn: Connection<Value> = Connection::new();
    let mut chat_a = conn.on_event("chat");
    let mut chat_b = conn.on_event("chat");
    let mut news = conn.on_event("news");
    let mut any = conn.on_any();

    let n = conn
        .deliver_frame(r#"{"event":"chat","payload":{"text":"hi"}}"#)
        .unwrap();
    assert_eq!(n, 3);

    assert_eq!(chat_a.recv().await.unwrap(), json!({"text": "hi"}));
    assert_eq!(chat_b.recv().await.unwrap(), json!({"text": "hi"}));
    assert_eq!(any.recv().await.unwrap().0, "chat");
    assert!(news.try_recv().is_none());
}

#[test]
fn bad_frame_is_malformed() {
    let conn: Connection<Value> = Connection::new();
    assert!(matches!(
        conn.deliver_frame(r#"{"payload":1}"#),
        Err(MeshError::Malformed(_))
    ));
    assert!(matches!(
        conn.deliver_frame("nope"),
        Err(MeshError::Malformed(_))
    ));
}

#[tokio::test]
async fn delivery_order_is_preserved() {
    let conn: Connection<u32> = Connection::new();
    let mut sub = conn.on_event("tick");
    for i in 0..100 {
        conn.deliver("tick", i);
    }
    let got: Vec<u32> = (&mut sub).take(100).collect().await;
    assert_eq!(got, (0..100).collect::<Vec<_>>());
}

#[tokio::test]
async fn once_takes_only_the_next_payload() {
    let conn: Connection<u32> = Connection::new();
    let first = conn.once("tick");
    conn.deliver("tick", 1);
    conn.deliver("tick", 2);
    assert_eq!(first.await.unwrap(), 1);
    assert_eq!(conn.subscriber_count("tick"), 0);
}

#[test]
fn dropped_subscriptions_are_pruned() {
    let conn: Connection<u32> = Connection::new();
    let keep = conn.on_event("tick");
    let gone = conn.on_event("tick");
    assert_eq!(conn.subscriber_count("tick"), 2);

    drop(gone);
    assert_eq!(conn.deliver("tick", 7), 1);
    assert_eq!(conn.subscriber_count("tick"), 1);
    drop(keep);
}

#[tokio::test]
async fn dispose_ends_subscriptions() {
    let conn: Connection<u32> = Connection::new();
    let mut sub = conn.on_event("tick");
    let pending = conn.once("tick");
    let frames = Arc::new(Mutex::new(0));
    let count = Arc::clone(&frames);
    conn.attach_sender(move |_| {
        *count.lock().unwrap() += 1;
        Ok(())
    });

    conn.dispose();
    assert!(conn.is_disposed());
    assert!(sub.recv().await.is_none());
    assert!(matches!(pending.await, Err(MeshError::Closed)));
    assert!(matches!(conn.send("tick", &1), Err(MeshError::NotConnected)));
    assert_eq!(conn.deliver("tick", 1), 0);
    assert_eq!(*frames.lock().unwrap(), 0);
}
