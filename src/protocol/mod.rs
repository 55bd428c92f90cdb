//! Tunnel protocol module
//!
//! This module implements the control protocol spoken between the local
//! and the remote gateway over a WebSocket connection: JSON control
//! messages in text frames, relayed payload in binary frames, and an
//! HMAC-SHA256 token that binds each connect request to a server nonce.

mod codec;
mod digest;
mod types;

pub use codec::{binary_frames, decode_control, encode_control, read_control, write_control};
pub use digest::{AuthCredentialBuilder, Nonce, NONCE_LEN};
pub use types::{Action, ControlMessage, MessageType, TUNNEL_SUBPROTOCOL};
