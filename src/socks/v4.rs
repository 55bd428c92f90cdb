//! SOCKS4 and SOCKS4a request handling
//!
//! ```text
//! +----+----+----+----+----+----+----+----+----+----+....+----+
//! | VN | CD | DSTPORT |      DSTIP        | USERID       |NULL|
//! +----+----+----+----+----+----+----+----+----+----+....+----+
//! ```
//!
//! SOCKS4a marks a domain request with a DSTIP of `0.0.0.x` (x non-zero)
//! and appends a NUL-terminated hostname after the USERID.

use super::consts::*;
use super::types::TargetAddr;
use crate::error::GatewayError;
use std::net::Ipv4Addr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Parsed SOCKS4 request (the VN byte has already been consumed)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks4Request {
    /// Command code
    pub command: u8,
    /// Destination endpoint
    pub target: TargetAddr,
    /// Client supplied USERID, ignored for authorization
    pub user_id: Vec<u8>,
}

/// Read a SOCKS4/4a request following the version byte
pub async fn parse_socks4_request<S>(stream: &mut S) -> Result<Socks4Request, GatewayError>
where
    S: AsyncRead + Unpin,
{
    let command = stream.read_u8().await?;
    let port = stream.read_u16().await?;
    let mut ip = [0u8; 4];
    stream.read_exact(&mut ip).await?;
    let user_id = read_nul_terminated(stream).await?;

    let target = if is_socks4a(ip) {
        let host = read_nul_terminated(stream).await?;
        if host.is_empty() {
            return Err(GatewayError::Protocol(
                "Empty SOCKS4a hostname".to_string(),
            ));
        }
        let host = String::from_utf8(host)
            .map_err(|_| GatewayError::Protocol("Invalid UTF-8 in SOCKS4a hostname".to_string()))?;
        TargetAddr::domain(host, port)
    } else {
        TargetAddr::ipv4(Ipv4Addr::from(ip), port)
    };

    Ok(Socks4Request {
        command,
        target,
        user_id,
    })
}

/// `0.0.0.x` with `x != 0`
fn is_socks4a(ip: [u8; 4]) -> bool {
    ip[0] == 0 && ip[1] == 0 && ip[2] == 0 && ip[3] != 0
}

async fn read_nul_terminated<S>(stream: &mut S) -> Result<Vec<u8>, GatewayError>
where
    S: AsyncRead + Unpin,
{
    let mut field = Vec::new();
    loop {
        let byte = stream.read_u8().await?;
        if byte == 0 {
            return Ok(field);
        }
        if field.len() == MAX_SOCKS4_FIELD_LEN {
            return Err(GatewayError::Protocol(
                "SOCKS4 field exceeds 255 bytes".to_string(),
            ));
        }
        field.push(byte);
    }
}

/// Send a SOCKS4 reply with a zero port/address
pub async fn send_socks4_reply<S>(stream: &mut S, granted: bool) -> Result<(), GatewayError>
where
    S: AsyncWrite + Unpin,
{
    let code = if granted {
        SOCKS4_REPLY_GRANTED
    } else {
        SOCKS4_REPLY_REJECTED
    };
    stream
        .write_all(&[SOCKS4_REPLY_VERSION, code, 0, 0, 0, 0, 0, 0])
        .await?;
    stream.flush().await?;
    Ok(())
}
