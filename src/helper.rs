//! Helper utilities for Wssocks
//!
//! Shared constants and small utilities used throughout the gateway.

use std::future::Future;
use std::time::Duration;

/// Default buffer size for raw socket reads during relaying
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Default outbound connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Default front-door handshake idle timeout in seconds
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 900;

/// Maximum payload carried by a single WebSocket binary frame
pub const MAX_WS_FRAME_PAYLOAD: usize = 65535;

/// Run `fut` with a deadline, mapping expiry to a `TimedOut` IO error
pub async fn with_timeout<F, T>(timeout: Duration, what: &str, fut: F) -> std::io::Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("{} timed out after {:?}", what, timeout),
        )),
    }
}
