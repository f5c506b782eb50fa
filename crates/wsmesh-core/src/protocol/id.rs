//! Correlation / session id generator.
//!
//! 12 random bytes, URL-safe base64 without padding (16 chars). Collision
//! odds among the handful of requests outstanding at once are negligible,
//! and unlike a counter the ids carry no information across reconnects.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

/// Random byte count behind every id.
pub const ID_BYTES: usize = 12;

/// Generate a fresh id.
pub fn new_id() -> String {
    let mut buf = [0u8; ID_BYTES];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}
