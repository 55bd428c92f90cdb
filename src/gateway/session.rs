//! Per-connection orchestration
//!
//! A [`GatewaySession`] owns one client-facing connection and walks it through
//! `Accepted -> Handshaking -> Dialing -> Relaying -> Closed`. The handlers are
//! immutable and shared by every session of a listener.

use super::dialer::{create_dialer, Dialer};
use crate::config::{FrontDoor, GatewayConfig};
use crate::error::GatewayError;
use crate::http::{send_status, ConnectRequest, HttpConnect, HttpStatus};
use crate::protocol::TUNNEL_SUBPROTOCOL;
use crate::relay::relay_tcp;
use crate::socks::{accept_bind, SocksCommand, SocksHandshake, SocksRequest, TargetAddr};
use crate::transport::{server_acceptor, StreamDyn};
use crate::tunnel::TunnelServer;
use anyhow::Result;
use std::fmt::Debug;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tracing::{debug, info, trace};

/// Handles accepted connections for one listener
#[async_trait::async_trait]
pub trait SessionHandler: Send + Sync + Debug {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Serve one accepted connection to completion
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), GatewayError>;
}

/// Lifecycle of a client-facing connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection accepted, nothing read yet
    Accepted,
    /// Front-door handshake in progress
    Handshaking,
    /// Connecting to the target
    Dialing,
    /// Bytes flowing between client and target
    Relaying,
    /// Session over
    Closed,
}

/// Front-door request waiting for its dial outcome
#[derive(Debug)]
enum Pending {
    Socks(SocksRequest),
    Http(ConnectRequest),
}

impl Pending {
    fn target(&self) -> &TargetAddr {
        match self {
            Pending::Socks(request) => &request.target,
            Pending::Http(request) => &request.target,
        }
    }

    fn early_data(&self) -> &[u8] {
        match self {
            Pending::Socks(_) => &[],
            Pending::Http(request) => &request.early_data,
        }
    }

    async fn reply_success<S>(&self, stream: &mut S) -> Result<(), GatewayError>
    where
        S: AsyncWrite + Unpin,
    {
        match self {
            Pending::Socks(request) => request.reply_success(stream, None).await,
            Pending::Http(_) => send_status(stream, HttpStatus::Established).await,
        }
    }

    async fn reply_failure<S>(&self, stream: &mut S, err: &GatewayError) -> Result<(), GatewayError>
    where
        S: AsyncWrite + Unpin,
    {
        match self {
            Pending::Socks(request) => request.reply_failure(stream, err).await,
            Pending::Http(_) => send_status(stream, HttpStatus::BadRequest).await,
        }
    }
}

/// One client-facing connection of a local gateway
#[derive(Debug)]
pub struct GatewaySession<S> {
    stream: S,
    peer: SocketAddr,
    local_ip: IpAddr,
    state: SessionState,
}

impl<S> GatewaySession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an accepted connection; `local_ip` is the interface it arrived on
    pub fn new(stream: S, peer: SocketAddr, local_ip: IpAddr) -> Self {
        GatewaySession {
            stream,
            peer,
            local_ip,
            state: SessionState::Accepted,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session; the client connection is closed on return
    pub async fn run(mut self, handler: &LocalHandler) -> Result<(), GatewayError> {
        let result = self.drive(handler).await;
        self.advance(SessionState::Closed);
        result
    }

    fn advance(&mut self, next: SessionState) {
        trace!("Session {}: {:?} -> {:?}", self.peer, self.state, next);
        self.state = next;
    }

    async fn drive(&mut self, handler: &LocalHandler) -> Result<(), GatewayError> {
        self.advance(SessionState::Handshaking);
        let pending = tokio::time::timeout(handler.handshake_timeout, self.handshake(handler))
            .await
            .map_err(|_| {
                GatewayError::Timeout(format!("Handshake with {} went idle", self.peer))
            })??;

        if let Pending::Socks(request) = &pending {
            if request.command == SocksCommand::Bind {
                return self.bind(handler).await;
            }
        }

        info!("{} -> {} via {}", self.peer, pending.target(), handler.dialer.name());
        self.advance(SessionState::Dialing);
        match handler.dialer.dial(pending.target()).await {
            Ok(mut upstream) => {
                upstream.forward(pending.early_data()).await?;
                pending.reply_success(&mut self.stream).await?;
                self.advance(SessionState::Relaying);
                upstream.relay(&mut self.stream).await
            }
            Err(e) => {
                pending.reply_failure(&mut self.stream, &e).await?;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self, handler: &LocalHandler) -> Result<Pending, GatewayError> {
        let config = &handler.config;
        match config.front_door {
            FrontDoor::Socks => {
                let allow_bind = config.allow_bind && handler.dialer.supports_bind();
                let request = SocksHandshake::new(&config.auth, allow_bind)
                    .run(&mut self.stream)
                    .await?;
                Ok(Pending::Socks(request))
            }
            FrontDoor::Http => {
                let request = HttpConnect::new(&config.auth, config.path_filter.as_deref())
                    .run(&mut self.stream)
                    .await?;
                Ok(Pending::Http(request))
            }
        }
    }

    async fn bind(&mut self, handler: &LocalHandler) -> Result<(), GatewayError> {
        self.advance(SessionState::Dialing);
        let inbound = accept_bind(&mut self.stream, self.local_ip, handler.connect_timeout).await?;
        self.advance(SessionState::Relaying);
        relay_tcp(&mut self.stream, inbound).await?;
        Ok(())
    }
}

/// Serves the SOCKS or HTTP front door of a local gateway
#[derive(Debug)]
pub struct LocalHandler {
    config: GatewayConfig,
    dialer: Box<dyn Dialer>,
    handshake_timeout: Duration,
    connect_timeout: Duration,
}

impl LocalHandler {
    /// Build a handler, choosing the dialer from the configuration
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        Ok(Self::with_dialer(config, create_dialer(config)?))
    }

    /// Build a handler with an explicit dialer
    pub fn with_dialer(config: &GatewayConfig, dialer: Box<dyn Dialer>) -> Self {
        LocalHandler {
            config: config.clone(),
            dialer,
            handshake_timeout: config.handshake_timeout(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

#[async_trait::async_trait]
impl SessionHandler for LocalHandler {
    fn name(&self) -> &str {
        "local"
    }

    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), GatewayError> {
        let local_ip = stream.local_addr()?.ip();
        GatewaySession::new(stream, peer, local_ip).run(self).await
    }
}

/// Accepts tunnel upgrades on a remote gateway
pub struct RemoteHandler {
    proxy_path: String,
    server: TunnelServer,
    acceptor: Option<TlsAcceptor>,
    handshake_timeout: Duration,
}

impl RemoteHandler {
    /// Build a handler; loads the TLS material when configured
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let acceptor = match &config.tls {
            Some(tls) => Some(server_acceptor(tls)?),
            None => None,
        };
        Ok(RemoteHandler {
            proxy_path: config.proxy_path.clone(),
            server: TunnelServer::new(config),
            acceptor,
            handshake_timeout: config.handshake_timeout(),
        })
    }

    async fn upgrade(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<tokio_tungstenite::WebSocketStream<Box<dyn StreamDyn>>, GatewayError> {
        let stream: Box<dyn StreamDyn> = match &self.acceptor {
            Some(acceptor) => Box::new(acceptor.accept(stream).await.map_err(|e| {
                GatewayError::Transport(format!("TLS accept from {} failed: {}", peer, e))
            })?),
            None => Box::new(stream),
        };

        let proxy_path = self.proxy_path.as_str();
        let ws = accept_hdr_async(stream, |req: &Request, resp: Response| {
            check_upgrade(proxy_path, req, resp)
        })
        .await?;
        Ok(ws)
    }
}

impl Debug for RemoteHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteHandler")
            .field("proxy_path", &self.proxy_path)
            .field("server", &self.server)
            .field("tls", &self.acceptor.is_some())
            .finish()
    }
}

#[async_trait::async_trait]
impl SessionHandler for RemoteHandler {
    fn name(&self) -> &str {
        "remote"
    }

    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), GatewayError> {
        let ws = tokio::time::timeout(self.handshake_timeout, self.upgrade(stream, peer))
            .await
            .map_err(|_| GatewayError::Timeout(format!("Upgrade from {} went idle", peer)))??;
        debug!("Tunnel upgraded for {}", peer);
        self.server.serve(ws).await
    }
}

/// Whether `path` is `prefix` or lies below it on a segment boundary
fn within_path(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

/// Filter upgrades by path and confirm the tunnel subprotocol when offered
fn check_upgrade(
    proxy_path: &str,
    req: &Request,
    mut resp: Response,
) -> Result<Response, ErrorResponse> {
    let path = req.uri().path();
    if !within_path(path, proxy_path) {
        debug!("Refusing upgrade for path {}", path);
        let mut refusal = ErrorResponse::new(Some("Not Found".to_string()));
        *refusal.status_mut() = StatusCode::NOT_FOUND;
        return Err(refusal);
    }

    let offered = req
        .headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|protocol| protocol.trim() == TUNNEL_SUBPROTOCOL);
    if offered {
        resp.headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(TUNNEL_SUBPROTOCOL));
    }
    Ok(resp)
}
