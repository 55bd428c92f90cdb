//! Outbound dialing strategies
//!
//! A local gateway reaches targets either directly or through a remote
//! gateway. The choice is made once at startup from the configuration.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::protocol::binary_frames;
use crate::relay::{relay_tcp, relay_ws, TunnelEnd};
use crate::socks::TargetAddr;
use crate::transport::TcpTransport;
use crate::tunnel::{TunnelConnector, TunnelStream};
use anyhow::Result;
use futures::SinkExt;
use std::fmt::Debug;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// A connected target-facing stream
#[derive(Debug)]
pub enum Upstream {
    /// TCP connection straight to the target
    Direct(TcpStream),
    /// Tunnel whose remote end is connected to the target
    Tunnel(TunnelStream),
}

impl Upstream {
    /// Send bytes the client delivered before relaying started
    pub async fn forward(&mut self, data: &[u8]) -> Result<(), GatewayError> {
        if data.is_empty() {
            return Ok(());
        }
        match self {
            Upstream::Direct(target) => target.write_all(data).await?,
            Upstream::Tunnel(ws) => {
                for frame in binary_frames(data) {
                    ws.feed(frame).await?;
                }
                ws.flush().await?;
            }
        }
        Ok(())
    }

    /// Relay between the client connection and this upstream until either closes
    pub async fn relay<S>(self, client: S) -> Result<(), GatewayError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self {
            Upstream::Direct(target) => {
                let (sent, received) = relay_tcp(client, target).await?;
                debug!("Relay finished: {} bytes out, {} bytes in", sent, received);
                Ok(())
            }
            Upstream::Tunnel(ws) => relay_ws(client, ws, TunnelEnd::Local).await,
        }
    }
}

/// Strategy for reaching a target
///
/// Implementations are shared by every session of a gateway and must not
/// hold per-connection state.
#[async_trait::async_trait]
pub trait Dialer: Send + Sync + Debug {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Connect to `target`
    ///
    /// Every failure, including a timeout or a tunnel refusal, is returned as
    /// an error so the front door can answer its client.
    async fn dial(&self, target: &TargetAddr) -> Result<Upstream, GatewayError>;

    /// Whether SOCKS5 BIND can be served alongside this dialer
    fn supports_bind(&self) -> bool {
        false
    }
}

/// Dials targets over plain TCP
#[derive(Debug, Clone)]
pub struct DirectDialer {
    transport: TcpTransport,
}

impl DirectDialer {
    /// Create a direct dialer
    pub fn new(transport: TcpTransport) -> Self {
        DirectDialer { transport }
    }
}

#[async_trait::async_trait]
impl Dialer for DirectDialer {
    fn name(&self) -> &str {
        "direct"
    }

    async fn dial(&self, target: &TargetAddr) -> Result<Upstream, GatewayError> {
        let stream = match target {
            TargetAddr::Ip(addr) => {
                self.transport
                    .connect(&addr.ip().to_string(), addr.port())
                    .await?
            }
            TargetAddr::Domain(domain, port) => self.transport.connect(domain, *port).await?,
        };
        Ok(Upstream::Direct(stream))
    }

    fn supports_bind(&self) -> bool {
        true
    }
}

/// Dials targets through a remote gateway
#[derive(Debug, Clone)]
pub struct TunnelDialer {
    connector: TunnelConnector,
}

impl TunnelDialer {
    /// Create a tunnel dialer
    pub fn new(connector: TunnelConnector) -> Self {
        TunnelDialer { connector }
    }
}

#[async_trait::async_trait]
impl Dialer for TunnelDialer {
    fn name(&self) -> &str {
        "tunnel"
    }

    async fn dial(&self, target: &TargetAddr) -> Result<Upstream, GatewayError> {
        let ws = self.connector.open(target).await?;
        Ok(Upstream::Tunnel(ws))
    }
}

/// Pick the dialer for a local gateway
pub fn create_dialer(config: &GatewayConfig) -> Result<Box<dyn Dialer>> {
    match &config.tunnel {
        Some(tunnel) => {
            let connector = TunnelConnector::new(tunnel, config)?;
            Ok(Box::new(TunnelDialer::new(connector)))
        }
        None => Ok(Box::new(DirectDialer::new(TcpTransport::new(config)))),
    }
}
