//! HTTP CONNECT handshake
//!
//! Accepts `CONNECT host:port HTTP/1.1`, checks Basic proxy credentials and
//! an optional target prefix, then hands the destination to the gateway.

use super::request::{read_head, RequestHead};
use crate::config::AuthConfig;
use crate::error::GatewayError;
use crate::socks::TargetAddr;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Responses the front door can send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    /// 200, tunnel ready
    Established,
    /// 400, malformed request or failed dial
    BadRequest,
    /// 404, target outside the configured prefix
    NotFound,
    /// 405, anything but CONNECT
    MethodNotAllowed,
    /// 407, missing or wrong proxy credentials
    ProxyAuthRequired,
}

impl HttpStatus {
    /// Numeric status code
    pub fn code(self) -> u16 {
        match self {
            HttpStatus::Established => 200,
            HttpStatus::BadRequest => 400,
            HttpStatus::NotFound => 404,
            HttpStatus::MethodNotAllowed => 405,
            HttpStatus::ProxyAuthRequired => 407,
        }
    }

    /// Reason phrase
    pub fn reason(self) -> &'static str {
        match self {
            HttpStatus::Established => "Connection Established",
            HttpStatus::BadRequest => "Bad Request",
            HttpStatus::NotFound => "Not Found",
            HttpStatus::MethodNotAllowed => "Method Not Allowed",
            HttpStatus::ProxyAuthRequired => "Proxy Authentication Required",
        }
    }

    /// Full response head
    pub fn response(self) -> String {
        match self {
            HttpStatus::Established => format!("HTTP/1.1 200 {}\r\n\r\n", self.reason()),
            HttpStatus::ProxyAuthRequired => format!(
                "HTTP/1.1 407 {}\r\n\
                 Proxy-Authenticate: Basic realm=\"{}\"\r\n\
                 Content-Length: 0\r\n\
                 Connection: close\r\n\r\n",
                self.reason(),
                crate::NAME
            ),
            other => format!(
                "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                other.code(),
                other.reason()
            ),
        }
    }
}

/// Write a status response
pub async fn send_status<S>(stream: &mut S, status: HttpStatus) -> Result<(), GatewayError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(status.response().as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

/// An accepted CONNECT request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Where the client wants to go
    pub target: TargetAddr,
    /// Bytes the client sent after the request head
    pub early_data: Bytes,
}

/// Per-connection CONNECT handshake
#[derive(Debug, Clone, Copy)]
pub struct HttpConnect<'a> {
    auth: &'a AuthConfig,
    path_filter: Option<&'a str>,
}

impl<'a> HttpConnect<'a> {
    /// Create a handshake checking `auth` and, when set, a target prefix
    pub fn new(auth: &'a AuthConfig, path_filter: Option<&'a str>) -> Self {
        HttpConnect { auth, path_filter }
    }

    /// Read and validate the request, answering any rejection
    pub async fn run<S>(&self, stream: &mut S) -> Result<ConnectRequest, GatewayError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (head, early_data) = match read_head(stream).await {
            Ok(read) => read,
            Err(err @ GatewayError::Protocol(_)) => {
                send_status(stream, HttpStatus::BadRequest).await?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        debug!("HTTP {} {} {}", head.method, head.target, head.version);

        match self.check(&head) {
            Ok(target) => Ok(ConnectRequest { target, early_data }),
            Err((status, err)) => {
                warn!("Rejecting HTTP request with {}: {}", status.code(), err);
                send_status(stream, status).await?;
                Err(err)
            }
        }
    }

    fn check(&self, head: &RequestHead) -> Result<TargetAddr, (HttpStatus, GatewayError)> {
        if head.method != "CONNECT" {
            return Err((
                HttpStatus::MethodNotAllowed,
                GatewayError::Protocol(format!("Method {} not allowed", head.method)),
            ));
        }

        if self.auth.has_credentials() && !self.authorized(head) {
            return Err((
                HttpStatus::ProxyAuthRequired,
                GatewayError::Auth("Missing or invalid Proxy-Authorization".to_string()),
            ));
        }

        let authority = match self.path_filter {
            Some(prefix) => head.target.strip_prefix(prefix).ok_or_else(|| {
                (
                    HttpStatus::NotFound,
                    GatewayError::Protocol(format!(
                        "Target {} outside of {}",
                        head.target, prefix
                    )),
                )
            })?,
            None => head.target.as_str(),
        };

        TargetAddr::parse_authority(authority).map_err(|err| (HttpStatus::BadRequest, err))
    }

    fn authorized(&self, head: &RequestHead) -> bool {
        let Some(value) = head.header("Proxy-Authorization") else {
            return false;
        };
        let Some((scheme, encoded)) = value.split_once(' ') else {
            return false;
        };
        if !scheme.eq_ignore_ascii_case("basic") {
            return false;
        }
        let Ok(decoded) = BASE64.decode(encoded.trim()) else {
            return false;
        };
        match decoded.iter().position(|&b| b == b':') {
            Some(colon) => self.auth.matches(&decoded[..colon], &decoded[colon + 1..]),
            None => false,
        }
    }
}
