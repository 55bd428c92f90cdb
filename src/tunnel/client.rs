//! Local side of the tunnel control protocol
//!
//! Opens one WebSocket connection per proxied destination, waits for the
//! server's `hello`, sends a (possibly signed) connect request and waits for
//! the verdict.

use crate::config::{GatewayConfig, TunnelConfig};
use crate::error::GatewayError;
use crate::protocol::{
    read_control, write_control, Action, AuthCredentialBuilder, ControlMessage, MessageType, Nonce,
    TUNNEL_SUBPROTOCOL,
};
use crate::socks::TargetAddr;
use crate::transport::{client_connector, connect_tls, StreamDyn, TcpTransport};
use anyhow::{Context, Result};
use std::fmt;
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{client_async, WebSocketStream};
use tracing::{debug, warn};
use url::{Host, Url};

/// WebSocket connection to a remote gateway, plain or TLS
pub type TunnelStream = WebSocketStream<Box<dyn StreamDyn>>;

/// Client side of the control protocol
///
/// Built once per local gateway; each call to [`open`](Self::open) makes an
/// independent tunnel connection.
#[derive(Clone)]
pub struct TunnelConnector {
    url: Url,
    host: String,
    port: u16,
    credentials: Option<AuthCredentialBuilder>,
    tls: Option<TlsConnector>,
    transport: TcpTransport,
}

impl TunnelConnector {
    /// Create a connector for `tunnel`, dialing with the gateway's socket options
    pub fn new(tunnel: &TunnelConfig, config: &GatewayConfig) -> Result<Self> {
        let url = tunnel.url()?;
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => anyhow::bail!("Tunnel uri {} has no host", tunnel.uri),
        };
        let port = url
            .port_or_known_default()
            .with_context(|| format!("Tunnel uri {} has no port", tunnel.uri))?;

        let tls = if tunnel.is_secure() {
            Some(client_connector(tunnel).with_context(|| "Failed to build tunnel TLS client")?)
        } else {
            None
        };

        Ok(TunnelConnector {
            url,
            host,
            port,
            credentials: tunnel.secret.as_deref().map(AuthCredentialBuilder::new),
            tls,
            transport: TcpTransport::new(config),
        })
    }

    /// Tunnel endpoint
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Open a tunnel to `target`
    ///
    /// Establishing the WebSocket and waiting for the remote verdict each run
    /// under the connect timeout. Any outcome other than `success` is a dial
    /// failure so the front door can answer its client.
    pub async fn open(&self, target: &TargetAddr) -> Result<TunnelStream, GatewayError> {
        let connect_timeout = self.transport.connect_timeout();
        let mut ws = tokio::time::timeout(connect_timeout, self.handshake())
            .await
            .map_err(|_| {
                GatewayError::Timeout(format!("Tunnel handshake with {} timed out", self.url))
            })??;

        match tokio::time::timeout(connect_timeout, self.request(&mut ws, target)).await {
            Ok(Ok(())) => Ok(ws),
            Ok(Err(e)) => {
                let _ = ws.close(None).await;
                Err(e)
            }
            Err(_) => {
                let _ = ws.close(None).await;
                Err(GatewayError::Timeout(format!(
                    "Tunnel gave no answer for {} within {:?}",
                    target, connect_timeout
                )))
            }
        }
    }

    async fn handshake(&self) -> Result<TunnelStream, GatewayError> {
        let tcp = self.transport.connect(&self.host, self.port).await?;
        let stream: Box<dyn StreamDyn> = match &self.tls {
            Some(connector) => Box::new(connect_tls(connector, &self.host, tcp).await?),
            None => Box::new(tcp),
        };

        let mut request = self.url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(TUNNEL_SUBPROTOCOL));

        let (ws, response) = client_async(request, stream).await?;
        debug!("Tunnel upgraded with {} ({})", self.url, response.status());
        Ok(ws)
    }

    async fn request(
        &self,
        ws: &mut TunnelStream,
        target: &TargetAddr,
    ) -> Result<(), GatewayError> {
        let hello = read_control(ws)
            .await?
            .ok_or_else(|| GatewayError::dial_refused("Tunnel closed before hello"))?;
        if hello.kind != MessageType::Hello {
            return Err(GatewayError::Protocol(format!("Expected hello, got {}", hello)));
        }

        let address = target.host();
        let port = target.port();
        let token = match (&self.credentials, nonce_of(&hello)?) {
            (Some(builder), Some(nonce)) => Some(builder.token(&nonce, &address, port)),
            (Some(_), None) => {
                warn!("Tunnel {} sent no nonce, connecting unsigned", self.url);
                None
            }
            (None, _) => None,
        };
        write_control(ws, &ControlMessage::connect(&address, port, token)).await?;

        loop {
            let reply = read_control(ws).await?.ok_or_else(|| {
                GatewayError::dial_refused(format!("Tunnel closed before answering for {}", target))
            })?;
            if reply.kind != MessageType::Response {
                debug!("Ignoring control message: {}", reply);
                continue;
            }
            match reply.action {
                Some(Action::Success) => {
                    debug!("Tunnel ready for {}", target);
                    return Ok(());
                }
                Some(Action::Failure) => {
                    return Err(GatewayError::dial_refused(format!(
                        "Tunnel could not reach {}",
                        target
                    )))
                }
                Some(Action::Reject) => {
                    return Err(GatewayError::Auth(format!(
                        "Tunnel rejected the request for {}",
                        target
                    )))
                }
                _ => debug!("Ignoring control message: {}", reply),
            }
        }
    }
}

impl fmt::Debug for TunnelConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelConnector")
            .field("url", &self.url.as_str())
            .field("signed", &self.credentials.is_some())
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

/// Nonce carried by an `hs256` hello
fn nonce_of(hello: &ControlMessage) -> Result<Option<Nonce>, GatewayError> {
    match (hello.action, hello.token.as_deref()) {
        (Some(Action::Hs256), Some(token)) => Nonce::from_base64(token).map(Some),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_plain() {
        let tunnel = TunnelConfig::new("ws://127.0.0.1:8080/tunnel");
        let connector = TunnelConnector::new(&tunnel, &GatewayConfig::default()).unwrap();
        assert_eq!(connector.host, "127.0.0.1");
        assert_eq!(connector.port, 8080);
        assert!(connector.tls.is_none());
        assert!(connector.credentials.is_none());
    }

    #[test]
    fn test_connector_default_ports() {
        let tunnel = TunnelConfig::new("ws://relay.example.com/");
        let connector = TunnelConnector::new(&tunnel, &GatewayConfig::default()).unwrap();
        assert_eq!(connector.port, 80);

        let mut tunnel = TunnelConfig::new("wss://relay.example.com/");
        tunnel.skip_cert_verify = true;
        let connector = TunnelConnector::new(&tunnel, &GatewayConfig::default()).unwrap();
        assert_eq!(connector.port, 443);
        assert!(connector.tls.is_some());
    }

    #[test]
    fn test_connector_upper_case_scheme_uses_tls() {
        let mut tunnel = TunnelConfig::new("WSS://relay.example.com/");
        tunnel.skip_cert_verify = true;
        assert!(tunnel.validate().is_ok());
        let connector = TunnelConnector::new(&tunnel, &GatewayConfig::default()).unwrap();
        assert_eq!(connector.port, 443);
        assert!(connector.tls.is_some());
    }

    #[test]
    fn test_connector_ipv6_host_unbracketed() {
        let tunnel = TunnelConfig::new("ws://[::1]:9000/");
        let connector = TunnelConnector::new(&tunnel, &GatewayConfig::default()).unwrap();
        assert_eq!(connector.host, "::1");
    }

    #[test]
    fn test_nonce_of() {
        let nonce = Nonce::generate();
        assert_eq!(nonce_of(&ControlMessage::hello_hs256(&nonce)).unwrap(), Some(nonce));
        assert_eq!(nonce_of(&ControlMessage::hello()).unwrap(), None);

        let mut bad = ControlMessage::hello_hs256(&Nonce::generate());
        bad.token = Some("!!".to_string());
        assert!(nonce_of(&bad).is_err());
    }

    #[tokio::test]
    async fn test_open_unreachable_tunnel_is_dial_error() {
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let tunnel = TunnelConfig::new(&format!("ws://127.0.0.1:{}/", port));
        let config = GatewayConfig {
            connect_timeout: 2,
            ..Default::default()
        };
        let connector = TunnelConnector::new(&tunnel, &config).unwrap();

        let err = connector
            .open(&TargetAddr::domain("example.com".to_string(), 80))
            .await
            .unwrap_err();
        assert!(err.is_dial());
    }
}
