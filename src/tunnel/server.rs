//! Remote side of the tunnel control protocol
//!
//! After a WebSocket upgrade the server greets the client with a `hello`
//! (carrying a fresh nonce when a secret is configured), answers echo requests,
//! and handles exactly one connect request: dial the target, report the
//! outcome, then relay.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::protocol::{
    read_control, write_control, Action, AuthCredentialBuilder, ControlMessage, MessageType, Nonce,
};
use crate::relay::{relay_ws, TunnelEnd};
use crate::transport::TcpTransport;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

/// Server side of the control protocol
///
/// Immutable and shared by every tunnel connection of a remote gateway.
#[derive(Debug, Clone)]
pub struct TunnelServer {
    credentials: Option<AuthCredentialBuilder>,
    transport: TcpTransport,
}

impl TunnelServer {
    /// Create a tunnel server from gateway configuration
    pub fn new(config: &GatewayConfig) -> Self {
        TunnelServer {
            credentials: config.secret.as_deref().map(AuthCredentialBuilder::new),
            transport: TcpTransport::new(config),
        }
    }

    /// Drive one upgraded WebSocket connection to completion
    ///
    /// A rejected token leaves the connection open; the client decides
    /// whether to close it or retry. A dial failure is reported and the
    /// connection closed.
    pub async fn serve<W>(&self, mut ws: WebSocketStream<W>) -> Result<(), GatewayError>
    where
        W: AsyncRead + AsyncWrite + Unpin,
    {
        let nonce = Nonce::generate();
        let hello = match self.credentials {
            Some(_) => ControlMessage::hello_hs256(&nonce),
            None => ControlMessage::hello(),
        };
        write_control(&mut ws, &hello).await?;

        loop {
            let msg = match read_control(&mut ws).await? {
                Some(msg) => msg,
                None => {
                    debug!("Tunnel closed before a connect request");
                    return Ok(());
                }
            };

            if msg.is(MessageType::Request, Action::Echo) {
                write_control(&mut ws, &ControlMessage::echo_response(&msg)).await?;
                continue;
            }

            if !msg.is(MessageType::Request, Action::Connect) {
                debug!("Ignoring control message: {}", msg);
                continue;
            }

            let (address, port) = match (msg.address.as_deref(), msg.port) {
                (Some(address), Some(port)) if !address.is_empty() => (address, port),
                _ => {
                    return Err(GatewayError::Protocol(
                        "Connect request without address or port".to_string(),
                    ))
                }
            };

            if !self.authorize(&nonce, address, port, msg.token.as_deref()) {
                warn!("Rejecting tunnel request to {}:{}: bad token", address, port);
                write_control(&mut ws, &ControlMessage::response(Action::Reject)).await?;
                continue;
            }

            match self.transport.connect(address, port).await {
                Ok(target) => {
                    write_control(&mut ws, &ControlMessage::response(Action::Success)).await?;
                    info!("Tunnel connected to {}:{}", address, port);
                    return relay_ws(target, ws, TunnelEnd::Remote).await;
                }
                Err(e) => {
                    warn!("Tunnel dial failed: {}", e);
                    write_control(&mut ws, &ControlMessage::response(Action::Failure)).await?;
                    let _ = ws.close(None).await;
                    return Err(e);
                }
            }
        }
    }

    fn authorize(&self, nonce: &Nonce, address: &str, port: u16, token: Option<&str>) -> bool {
        match &self.credentials {
            None => true,
            Some(builder) => token.is_some_and(|token| builder.verify(nonce, address, port, token)),
        }
    }
}
