//! Relay bridge
//!
//! Symmetric byte pumps that tie a client-facing connection to a
//! target-facing one. Bytes are forwarded unmodified and in order; when one
//! side closes or fails, the other is closed as well.

mod tcp;
mod websocket;

pub use tcp::relay_tcp;
pub use websocket::{relay_ws, TunnelEnd};
