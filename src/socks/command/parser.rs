//! SOCKS5 command parser
//!
//! Parses SOCKS5 command requests from the client.

use super::reply::build_reply;
use crate::error::{GatewayError, Socks5ReplyCode};
use crate::socks::consts::*;
use crate::socks::types::{SocksCommand, TargetAddr};
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// Parse a SOCKS5 command from the stream
///
/// # SOCKS5 Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Unknown commands and address types are answered with the matching reply
/// code before the error is returned.
pub async fn parse_command<S>(stream: &mut S) -> Result<(SocksCommand, TargetAddr), GatewayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Read: VER CMD RSV ATYP
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;

    let version = header[0];
    let cmd_byte = header[1];
    let addr_type = header[3];

    if version != SOCKS5_VERSION {
        build_reply(stream, Socks5ReplyCode::GeneralFailure, None).await?;
        return Err(GatewayError::Protocol(format!(
            "Unsupported SOCKS version in command: {}",
            version
        )));
    }

    let command = match SocksCommand::from_byte(cmd_byte) {
        Some(command) => command,
        None => {
            build_reply(stream, Socks5ReplyCode::CommandNotSupported, None).await?;
            return Err(GatewayError::Protocol(format!(
                "Unknown command: {}",
                cmd_byte
            )));
        }
    };

    let target_addr = match parse_address(stream, addr_type).await? {
        Some(addr) => addr,
        None => {
            build_reply(stream, Socks5ReplyCode::AddressTypeNotSupported, None).await?;
            return Err(GatewayError::Protocol(format!(
                "Unsupported address type: {}",
                addr_type
            )));
        }
    };

    tracing::debug!("Parsed SOCKS5 command: {} to {}", command, target_addr);

    Ok((command, target_addr))
}

/// Parse the address portion of a SOCKS5 request
///
/// Returns `Ok(None)` for an unknown address type.
async fn parse_address<S>(stream: &mut S, addr_type: u8) -> Result<Option<TargetAddr>, GatewayError>
where
    S: AsyncRead + Unpin,
{
    let addr = match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            let port = stream.read_u16().await?;
            TargetAddr::ipv4(Ipv4Addr::from(addr), port)
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            let domain_len = stream.read_u8().await? as usize;
            if domain_len == 0 {
                return Err(GatewayError::Protocol("Empty domain name".to_string()));
            }

            let mut domain_buf = vec![0u8; domain_len];
            stream.read_exact(&mut domain_buf).await?;
            let domain = String::from_utf8(domain_buf)
                .map_err(|_| GatewayError::Protocol("Invalid UTF-8 in domain name".to_string()))?;
            let port = stream.read_u16().await?;

            TargetAddr::domain(domain, port)
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            let port = stream.read_u16().await?;
            TargetAddr::ipv6(Ipv6Addr::from(addr), port)
        }

        _ => return Ok(None),
    };

    Ok(Some(addr))
}
