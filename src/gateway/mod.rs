//! Gateway listener
//!
//! Binds the configured endpoint and spawns one session per accepted
//! connection. A local gateway serves the SOCKS or HTTP CONNECT front door;
//! a remote gateway accepts tunnel upgrades.

mod dialer;
mod session;

pub use dialer::{create_dialer, Dialer, DirectDialer, TunnelDialer, Upstream};
pub use session::{GatewaySession, LocalHandler, RemoteHandler, SessionHandler, SessionState};

use crate::config::{GatewayConfig, Role};
use crate::error::GatewayError;
use crate::transport::SocketOpts;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Backoff after a failed accept (e.g. out of file descriptors)
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// A bound gateway ready to accept connections
#[derive(Debug)]
pub struct Gateway {
    listener: TcpListener,
    handler: Arc<dyn SessionHandler>,
    socket_opts: SocketOpts,
}

impl Gateway {
    /// Validate `config`, build the role's handler and bind the listener
    pub async fn bind(config: &GatewayConfig) -> Result<Self> {
        config.validate()?;

        let handler: Arc<dyn SessionHandler> = match config.role {
            Role::Local => Arc::new(LocalHandler::new(config)?),
            Role::Remote => Arc::new(RemoteHandler::new(config)?),
        };

        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

        info!(
            "{} gateway listening on {}",
            handler.name(),
            listener.local_addr()?
        );

        Ok(Gateway {
            listener,
            handler,
            socket_opts: SocketOpts::from_tcp_config(&config.tcp),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until a shutdown signal arrives
    ///
    /// Sessions already running are left to finish on their own.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("Accepted connection from {}", peer);
                            self.socket_opts.hint(&stream);
                            let handler = self.handler.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handler.handle(stream, peer).await {
                                    log_session_error(peer, &e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping gateway");
                    break;
                }
            }
        }

        info!("Gateway stopped");
        Ok(())
    }
}

fn log_session_error(peer: SocketAddr, err: &GatewayError) {
    match err {
        GatewayError::Io(_) | GatewayError::WebSocket(_) | GatewayError::Timeout(_) => {
            debug!("Session {} closed: {}", peer, err)
        }
        _ => warn!("Session {} failed: {}", peer, err),
    }
}
