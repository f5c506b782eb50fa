//! Top-level facade crate for wsMesh.
//!
//! Re-exports the protocol core and the peer runtime so users can depend on a single crate.

pub mod core {
    pub use wsmesh_core::*;
}

pub mod peer {
    pub use wsmesh_peer::*;
}
