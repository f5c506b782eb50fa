//! Protocol modules.
//!
//! - `envelope`: the JSON text frame every message rides in.
//! - `id`: random correlation / session identifiers.
//!
//! Decoding is panic-free: malformed input is reported as
//! `MeshError::Malformed` so callers can drop the frame and keep reading.

pub mod envelope;
pub mod id;

pub use envelope::{decode, encode, Envelope, MsgKind, PROTOCOL_VERSION};
pub use id::new_id;
