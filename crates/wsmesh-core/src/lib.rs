//! wsMesh core: transport-agnostic protocol primitives, error types, and
//! reconnect policy.
//!
//! This crate defines the wire-level envelope, the correlation id generator,
//! the backoff policy, and the error surface shared by the peer runtime. It
//! carries no transport or async runtime dependencies so it can be reused by
//! any socket implementation.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed input surfaces as `MeshError::Malformed` so a hostile peer can
//! never take down the connection.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod backoff;
pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{MeshError, Result};
