//! SOCKS handshake state machine
//!
//! One [`SocksHandshake`] drives a client connection from the first byte to
//! a parsed request. Each state has its own step function; a failing step
//! has already written whatever response the protocol allows, so the caller
//! only needs to close the connection.

use super::auth::{negotiate_method, verify_password, AuthMethod};
use super::command::{build_reply, parse_command};
use super::consts::*;
use super::types::{SocksCommand, SocksRequest, SocksVersion};
use super::v4::{parse_socks4_request, send_socks4_reply};
use crate::config::AuthConfig;
use crate::error::{GatewayError, Socks5ReplyCode};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, warn};

/// Handshake progress
#[derive(Debug)]
enum State {
    /// Waiting for the version byte
    Init,
    /// SOCKS5 method selection
    AuthSelect,
    /// RFC 1929 sub-negotiation
    AuthVerify,
    /// SOCKS5 request
    Command,
    /// SOCKS4/4a request
    Socks4Command,
    /// Request accepted, ready to dial
    Established(SocksRequest),
}

/// Per-connection SOCKS4/4a/5 handshake
#[derive(Debug, Clone, Copy)]
pub struct SocksHandshake<'a> {
    auth: &'a AuthConfig,
    allow_bind: bool,
}

impl<'a> SocksHandshake<'a> {
    /// Create a handshake checking clients against `auth`
    pub fn new(auth: &'a AuthConfig, allow_bind: bool) -> Self {
        SocksHandshake { auth, allow_bind }
    }

    /// Run the handshake to completion
    pub async fn run<S>(&self, stream: &mut S) -> Result<SocksRequest, GatewayError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut state = State::Init;
        loop {
            state = match state {
                State::Init => self.read_version(stream).await?,
                State::AuthSelect => self.select_method(stream).await?,
                State::AuthVerify => {
                    verify_password(stream, self.auth).await?;
                    State::Command
                }
                State::Command => self.read_command(stream).await?,
                State::Socks4Command => self.read_socks4_command(stream).await?,
                State::Established(request) => return Ok(request),
            };
        }
    }

    async fn read_version<S>(&self, stream: &mut S) -> Result<State, GatewayError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match stream.read_u8().await? {
            SOCKS5_VERSION => Ok(State::AuthSelect),
            SOCKS4_VERSION => Ok(State::Socks4Command),
            // Not a SOCKS client; close without answering
            other => Err(GatewayError::Protocol(format!(
                "Unsupported SOCKS version: {}",
                other
            ))),
        }
    }

    async fn select_method<S>(&self, stream: &mut S) -> Result<State, GatewayError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match negotiate_method(stream, self.auth).await? {
            AuthMethod::Password => Ok(State::AuthVerify),
            AuthMethod::None => Ok(State::Command),
        }
    }

    async fn read_command<S>(&self, stream: &mut S) -> Result<State, GatewayError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (command, target) = parse_command(stream).await?;

        match command {
            SocksCommand::Connect => {}
            SocksCommand::Bind if self.allow_bind => {}
            SocksCommand::Bind | SocksCommand::UdpAssociate => {
                warn!("SOCKS5 {} to {} not supported", command, target);
                build_reply(stream, Socks5ReplyCode::CommandNotSupported, None).await?;
                return Err(GatewayError::Protocol(format!(
                    "{} command not supported",
                    command
                )));
            }
        }

        Ok(State::Established(SocksRequest {
            version: SocksVersion::V5,
            command,
            target,
        }))
    }

    async fn read_socks4_command<S>(&self, stream: &mut S) -> Result<State, GatewayError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = parse_socks4_request(stream).await?;

        // SOCKS4 has no password field, so it cannot satisfy configured credentials
        if self.auth.has_credentials() {
            send_socks4_reply(stream, false).await?;
            return Err(GatewayError::Auth(
                "SOCKS4 request rejected: credentials are required".to_string(),
            ));
        }

        if request.command != SOCKS4_CMD_CONNECT {
            send_socks4_reply(stream, false).await?;
            return Err(GatewayError::Protocol(format!(
                "Unsupported SOCKS4 command: {}",
                request.command
            )));
        }

        Ok(State::Established(SocksRequest {
            version: SocksVersion::V4,
            command: SocksCommand::Connect,
            target: request.target,
        }))
    }
}

impl SocksRequest {
    /// Report a successful dial to the client
    pub async fn reply_success<S>(
        &self,
        stream: &mut S,
        bind_addr: Option<SocketAddr>,
    ) -> Result<(), GatewayError>
    where
        S: AsyncWrite + Unpin,
    {
        match self.version {
            SocksVersion::V5 => build_reply(stream, Socks5ReplyCode::Succeeded, bind_addr).await,
            SocksVersion::V4 => send_socks4_reply(stream, true).await,
        }
    }

    /// Report a failed dial to the client
    pub async fn reply_failure<S>(
        &self,
        stream: &mut S,
        err: &GatewayError,
    ) -> Result<(), GatewayError>
    where
        S: AsyncWrite + Unpin,
    {
        debug!("Replying failure to {} client: {}", self.version, err);
        match self.version {
            SocksVersion::V5 => build_reply(stream, Socks5ReplyCode::from(err), None).await,
            SocksVersion::V4 => send_socks4_reply(stream, false).await,
        }
    }
}
