//! SOCKS5 BIND command
//!
//! Opens a temporary listener and answers twice: first with the listening
//! address, then with the address of the peer that connected to it.

use super::command::build_reply;
use crate::error::{GatewayError, Socks5ReplyCode};
use crate::helper::with_timeout;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

/// Serve a BIND request on `local_ip` (the client-facing interface)
///
/// Returns the inbound connection once both replies have been written. On
/// failure the matching SOCKS5 failure reply has already been sent.
pub async fn accept_bind<S>(
    stream: &mut S,
    local_ip: IpAddr,
    timeout: Duration,
) -> Result<TcpStream, GatewayError>
where
    S: AsyncWrite + Unpin,
{
    let listener = match TcpListener::bind(SocketAddr::new(local_ip, 0)).await {
        Ok(listener) => listener,
        Err(e) => {
            build_reply(stream, Socks5ReplyCode::GeneralFailure, None).await?;
            return Err(GatewayError::Io(e));
        }
    };
    let bound = listener.local_addr()?;
    debug!("BIND listening on {}", bound);

    build_reply(stream, Socks5ReplyCode::Succeeded, Some(bound)).await?;

    match with_timeout(timeout, "BIND accept", listener.accept()).await {
        Ok((inbound, peer)) => {
            info!("BIND on {} accepted {}", bound, peer);
            build_reply(stream, Socks5ReplyCode::Succeeded, Some(peer)).await?;
            Ok(inbound)
        }
        Err(e) => {
            let err = GatewayError::dial(bound, &e);
            build_reply(stream, Socks5ReplyCode::from(&err), None).await?;
            Err(err)
        }
    }
}
