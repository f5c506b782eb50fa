//! Envelope (JSON text frame).
//!
//! Optional fields are omitted on encode rather than written as `null`; a
//! `null` payload is the same as no payload and is stored as `None`.
//! Decoding is forward-compatible on `t`: an unknown message type decodes
//! into [`MsgKind::Unknown`] and routing layers drop it.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{MeshError, Result};

/// Protocol version stamped on every envelope we produce.
pub const PROTOCOL_VERSION: u32 = 1;

/// Envelope message type (`t` on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MsgKind {
    Event,
    Req,
    Res,
    Ping,
    Pong,
    Sys,
    /// Anything else. Kept verbatim so it can be logged.
    Unknown(String),
}

impl MsgKind {
    pub fn as_str(&self) -> &str {
        match self {
            MsgKind::Event => "event",
            MsgKind::Req => "req",
            MsgKind::Res => "res",
            MsgKind::Ping => "ping",
            MsgKind::Pong => "pong",
            MsgKind::Sys => "sys",
            MsgKind::Unknown(s) => s,
        }
    }
}

impl From<String> for MsgKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "event" => MsgKind::Event,
            "req" => MsgKind::Req,
            "res" => MsgKind::Res,
            "ping" => MsgKind::Ping,
            "pong" => MsgKind::Pong,
            "sys" => MsgKind::Sys,
            _ => MsgKind::Unknown(s),
        }
    }
}

impl From<MsgKind> for String {
    fn from(k: MsgKind) -> Self {
        match k {
            MsgKind::Unknown(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

/// The single wire message unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version.
    #[serde(rename = "v")]
    pub version: u32,
    /// Message type.
    #[serde(rename = "t")]
    pub kind: MsgKind,
    /// Routing name (event / req / sys).
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Correlation id (req / res).
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Sender clock, unix millis. Informational only.
    #[serde(rename = "ts", deserialize_with = "de_timestamp")]
    pub timestamp: i64,
    /// Opaque payload.
    #[serde(rename = "d", default, skip_serializing_if = "is_absent")]
    pub data: Option<Value>,
}

impl Envelope {
    fn new(kind: MsgKind) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            kind,
            name: None,
            correlation_id: None,
            timestamp: now_ms(),
            data: None,
        }
    }

    pub fn event(name: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            name: Some(name.into()),
            data: payload(data),
            ..Self::new(MsgKind::Event)
        }
    }

    pub fn sys(name: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            name: Some(name.into()),
            data: payload(data),
            ..Self::new(MsgKind::Sys)
        }
    }

    pub fn request(name: impl Into<String>, correlation_id: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            name: Some(name.into()),
            correlation_id: Some(correlation_id.into()),
            data: payload(data),
            ..Self::new(MsgKind::Req)
        }
    }

    /// Build the `res` answering `req`: same correlation id and name.
    pub fn response_to(req: &Envelope, data: Option<Value>) -> Self {
        Self {
            name: req.name.clone(),
            correlation_id: req.correlation_id.clone(),
            data: payload(data),
            ..Self::new(MsgKind::Res)
        }
    }

    pub fn ping() -> Self {
        Self::new(MsgKind::Ping)
    }

    pub fn pong() -> Self {
        Self::new(MsgKind::Pong)
    }

    /// Reject envelopes stamped with a different protocol version.
    pub fn check_version(&self) -> Result<()> {
        if self.version != PROTOCOL_VERSION {
            return Err(MeshError::UnsupportedVersion {
                got: self.version,
                expected: PROTOCOL_VERSION,
            });
        }
        Ok(())
    }
}

fn payload(data: Option<Value>) -> Option<Value> {
    data.filter(|d| !d.is_null())
}

fn is_absent(data: &Option<Value>) -> bool {
    data.as_ref().map_or(true, Value::is_null)
}

/// Encode an envelope as a JSON text frame.
pub fn encode(env: &Envelope) -> Result<String> {
    serde_json::to_string(env).map_err(|e| MeshError::Internal(format!("envelope encode failed: {e}")))
}

/// Decode a JSON text frame.
pub fn decode(text: &str) -> Result<Envelope> {
    serde_json::from_str(text).map_err(|e| MeshError::Malformed(format!("invalid envelope json: {e}")))
}

/// Current unix time in milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

// Accepts any JSON number; fractional millis are truncated.
fn de_timestamp<'de, D>(de: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let n = serde_json::Number::deserialize(de)?;
    if let Some(i) = n.as_i64() {
        return Ok(i);
    }
    if n.as_u64().is_some() {
        return Err(D::Error::custom("ts out of range"));
    }
    n.as_f64()
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as i64)
        .ok_or_else(|| D::Error::custom("ts must be a number"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn encode_omits_absent_fields() {
        let mut env = Envelope::ping();
        env.timestamp = 42;
        assert_eq!(encode(&env).unwrap(), r#"{"v":1,"t":"ping","ts":42}"#);
    }

    #[test]
    fn round_trip_request_keeps_every_field() {
        let env = Envelope::request("files.list", "abc123", Some(json!({"dir": "/", "depth": 2})));
        let back = decode(&encode(&env).unwrap()).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn response_echoes_correlation_id() {
        let req = Envelope::request("ping-test", "id-1", None);
        let res = Envelope::response_to(&req, Some(json!({"x": 1})));
        assert_eq!(res.kind, MsgKind::Res);
        assert_eq!(res.correlation_id.as_deref(), Some("id-1"));
        assert_eq!(res.name.as_deref(), Some("ping-test"));
    }

    #[test]
    fn unknown_kind_survives_decode() {
        let env = decode(r#"{"v":1,"t":"gossip","ts":1}"#).unwrap();
        assert_eq!(env.kind, MsgKind::Unknown("gossip".into()));
        assert_eq!(env.kind.as_str(), "gossip");
    }

    #[test]
    fn null_payload_is_never_written() {
        let env = Envelope::event("chat", Some(Value::Null));
        assert_eq!(env.data, None);
        let text = encode(&env).unwrap();
        assert!(!text.contains("\"d\""), "{text}");
        assert_eq!(decode(&text).unwrap(), env);

        let mut raw = Envelope::pong();
        raw.data = Some(Value::Null);
        assert!(!encode(&raw).unwrap().contains("null"));
    }

    #[test]
    fn version_check() {
        let mut env = Envelope::pong();
        assert!(env.check_version().is_ok());
        env.version = 2;
        let err = env.check_version().unwrap_err();
        assert_eq!(err.code().as_str(), "UNSUPPORTED_VERSION");
    }
}
