//! # Wssocks - SOCKS and HTTP CONNECT proxy with a WebSocket tunnel
//!
//! Wssocks accepts SOCKS4/4a, SOCKS5 or HTTP CONNECT requests from local
//! applications and connects them to their destination, either directly or
//! through a second Wssocks instance reached over a WebSocket (`ws://` or
//! `wss://`) connection. Useful where only HTTP(S) egress is allowed.
//!
//! ## Features
//!
//! - **SOCKS4, SOCKS4a and SOCKS5**: detected from the first byte, with
//!   RFC 1929 username/password authentication
//! - **HTTP CONNECT**: Basic proxy authentication and an optional path filter
//! - **WebSocket tunnel**: JSON control messages, HMAC-SHA256 signed connect
//!   requests, optional TLS on both ends
//! - **Direct mode**: no tunnel configured means targets are dialed directly
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wssocks::config::load_config;
//! use wssocks::Gateway;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     Gateway::bind(&config.gateway).await?.run(shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! App -> [local: SOCKS/HTTP front door] -ws(s)-> [remote: tunnel server] -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod helper;
pub mod http;
pub mod protocol;
pub mod relay;
pub mod socks;
pub mod transport;
pub mod tunnel;

// Re-export commonly used items
pub use config::{load_config, Config, GatewayConfig};
pub use error::{GatewayError, Socks5ReplyCode};
pub use gateway::Gateway;

/// Version of the Wssocks library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "wssocks");
    }
}
