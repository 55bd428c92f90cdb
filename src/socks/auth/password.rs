//! Username/password authentication handler
//!
//! Implements RFC 1929 username/password authentication for SOCKS5.

use crate::config::AuthConfig;
use crate::error::GatewayError;
use crate::socks::consts::{SOCKS5_AUTH_FAILURE, SOCKS5_AUTH_SUCCESS, SOCKS5_AUTH_VERSION};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Perform username/password authentication
///
/// # Protocol
///
/// Client sends:
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
///
/// Server responds:
/// ```text
/// +----+--------+
/// |VER | STATUS |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
/// ```
///
/// Credentials are compared as raw bytes, so they need not be UTF-8.
pub async fn verify_password<S>(stream: &mut S, auth: &AuthConfig) -> Result<(), GatewayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let version = stream.read_u8().await?;
    if version != SOCKS5_AUTH_VERSION {
        send_auth_result(stream, SOCKS5_AUTH_FAILURE).await?;
        return Err(GatewayError::Protocol(format!(
            "Invalid auth version: {}",
            version
        )));
    }

    let username = read_field(stream).await?;
    let password = read_field(stream).await?;

    if auth.matches(&username, &password) {
        send_auth_result(stream, SOCKS5_AUTH_SUCCESS).await?;
        debug!(
            "Authentication successful for user: {}",
            String::from_utf8_lossy(&username)
        );
        Ok(())
    } else {
        send_auth_result(stream, SOCKS5_AUTH_FAILURE).await?;
        Err(GatewayError::Auth(format!(
            "Authentication failed for user: {}",
            String::from_utf8_lossy(&username)
        )))
    }
}

/// Read one length-prefixed field
async fn read_field<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Vec<u8>, GatewayError> {
    let len = stream.read_u8().await? as usize;
    let mut field = vec![0u8; len];
    stream.read_exact(&mut field).await?;
    Ok(field)
}

/// Send authentication result to client
async fn send_auth_result<S: AsyncWrite + Unpin>(
    stream: &mut S,
    status: u8,
) -> Result<(), GatewayError> {
    stream.write_all(&[SOCKS5_AUTH_VERSION, status]).await?;
    stream.flush().await?;
    Ok(())
}
