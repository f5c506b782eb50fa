//! Envelope vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use wsmesh_core::protocol::{decode, encode, Envelope};

use vector_loader::TestVector;

fn load(name: &str) -> TestVector {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}

#[test]
fn envelope_vectors() {
    let files = [
        "env_ping_min.json",
        "env_req_full.json",
        "env_unknown_type.json",
        "env_float_ts.json",
        "env_null_data.json",
        "env_missing_ts.json",
        "env_missing_type.json",
        "env_version_string.json",
        "env_not_json.json",
        "env_b64_event.json",
    ];

    for f in files {
        let v = load(f);
        let res = decode(&v.frame.text());

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.code().as_str(), err.code, "vector={}", v.description);
            continue;
        }

        let env = res.expect("expected ok envelope");
        let ex = v.expect.expect("missing expect block");

        assert_eq!(env.version as u64, ex["v"].as_u64().unwrap(), "vector={}", v.description);
        assert_eq!(env.kind.as_str(), ex["t"].as_str().unwrap(), "vector={}", v.description);
        assert_eq!(env.timestamp, ex["ts"].as_i64().unwrap(), "vector={}", v.description);
        assert_eq!(env.name.as_deref(), ex["n"].as_str(), "vector={}", v.description);
        assert_eq!(env.correlation_id.as_deref(), ex["id"].as_str(), "vector={}", v.description);

        match ex.get("d") {
            Some(d) if !d.is_null() => assert_eq!(env.data.as_ref(), Some(d), "vector={}", v.description),
            _ => assert!(env.data.is_none(), "vector={}", v.description),
        }
    }
}

#[test]
fn reencode_is_compact() {
    let v = load("env_null_data.json");
    let env = decode(&v.frame.text()).unwrap();
    let text = encode(&env).unwrap();
    assert!(!text.contains("null"), "{text}");
    assert!(!text.contains("\"d\""), "{text}");
}

#[test]
fn round_trip_each_kind() {
    let samples = vec![
        Envelope::event("chat", Some(serde_json::json!({"msg": "hi", "tags": ["a", "b"]}))),
        Envelope::sys("presence", None),
        Envelope::request("ping-test", "q1", Some(serde_json::json!(1.5))),
        Envelope::response_to(&Envelope::request("n", "q2", None), Some(serde_json::json!(null))),
        Envelope::ping(),
        Envelope::pong(),
    ];
    for env in samples {
        let back = decode(&encode(&env).unwrap()).unwrap();
        assert_eq!(back, env);
    }
}
