//! Direct TCP dialing
//!
//! Resolves and connects to a destination within the connect timeout and
//! applies the configured socket options.

use super::SocketOpts;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::helper::{with_timeout, DEFAULT_CONNECT_TIMEOUT_SECS};
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

/// TCP dialer for targets and tunnel relays
#[derive(Debug, Clone)]
pub struct TcpTransport {
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
    /// Connection timeout
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create a TCP transport from gateway configuration
    pub fn new(config: &GatewayConfig) -> Self {
        TcpTransport {
            socket_opts: SocketOpts::from_tcp_config(&config.tcp),
            connect_timeout: config.connect_timeout(),
        }
    }

    /// Create a new TCP transport with default options
    pub fn with_defaults() -> Self {
        TcpTransport {
            socket_opts: SocketOpts::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Connection timeout
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Resolve `host` and connect to the first address that accepts
    ///
    /// Resolution and connection attempts share one deadline.
    pub async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, GatewayError> {
        let target = display_target(host, port);

        let stream = with_timeout(self.connect_timeout, "connect", async {
            let mut last_err = None;
            for addr in tokio::net::lookup_host((host, port)).await? {
                match TcpStream::connect(addr).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => {
                        tracing::trace!("Connect to {} failed: {}", addr, e);
                        last_err = Some(e);
                    }
                }
            }
            Err::<TcpStream, io::Error>(last_err.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses resolved")
            }))
        })
        .await
        .map_err(|e| GatewayError::dial(&target, &e))?;

        self.socket_opts.hint(&stream);

        tracing::debug!("TCP connection established to {}", target);

        Ok(stream)
    }
}

/// `host:port`, with IPv6 literals in brackets
fn display_target(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
