//! SOCKS front door
//!
//! This module implements the SOCKS4, SOCKS4a and SOCKS5 server handshake
//! for client connections accepted by a local gateway. The handshake only
//! learns the destination; dialing and relaying belong to the gateway
//! session.

mod auth;
mod bind;
mod command;
pub mod consts;
mod handshake;
mod types;
mod v4;

pub use auth::{negotiate_method, verify_password, AuthMethod};
pub use bind::accept_bind;
pub use command::{build_reply, parse_command, reply_bytes};
pub use consts::*;
pub use handshake::SocksHandshake;
pub use types::{SocksCommand, SocksRequest, SocksVersion, TargetAddr};
pub use v4::{parse_socks4_request, send_socks4_reply, Socks4Request};
