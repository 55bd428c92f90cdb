//! HTTP request head parsing
//!
//! The head is buffered until `httparse` reports it complete. Anything the
//! client pipelined after the blank line is handed back to the caller so it
//! can be forwarded once the target is connected.

use crate::error::GatewayError;
use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound for a request head
pub const MAX_HEAD_LEN: usize = 16 * 1024;

const MAX_HEADERS: usize = 32;

/// Parsed request line and headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Request method, e.g. `CONNECT`
    pub method: String,
    /// Request target as sent
    pub target: String,
    /// Protocol version, e.g. `HTTP/1.1`
    pub version: String,
    /// Header name/value pairs in arrival order
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// First header value matching `name` case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Parse the head at the start of `buf`
    ///
    /// Returns `None` while the head is incomplete, otherwise the head and
    /// its length in bytes.
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>, GatewayError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        let len = match req.parse(buf) {
            Ok(httparse::Status::Complete(len)) => len,
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(e) => {
                return Err(GatewayError::Protocol(format!("Malformed HTTP request: {}", e)))
            }
        };

        let (Some(method), Some(target), Some(minor)) = (req.method, req.path, req.version) else {
            return Err(GatewayError::Protocol("Incomplete HTTP request line".to_string()));
        };

        let headers = req
            .headers
            .iter()
            .map(|header| {
                let value = std::str::from_utf8(header.value).map_err(|_| {
                    GatewayError::Protocol(format!("Header {} is not UTF-8", header.name))
                })?;
                Ok((header.name.to_string(), value.trim().to_string()))
            })
            .collect::<Result<Vec<_>, GatewayError>>()?;

        let head = RequestHead {
            method: method.to_string(),
            target: target.to_string(),
            version: format!("HTTP/1.{}", minor),
            headers,
        };
        Ok(Some((head, len)))
    }
}

/// Read a request head; returns it with any bytes received after it
pub async fn read_head<S>(stream: &mut S) -> Result<(RequestHead, Bytes), GatewayError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some((head, len)) = RequestHead::parse(&buf)? {
            let _ = buf.split_to(len);
            return Ok((head, buf.freeze()));
        }
        if buf.len() >= MAX_HEAD_LEN {
            return Err(GatewayError::Protocol(format!(
                "HTTP request head exceeds {} bytes",
                MAX_HEAD_LEN
            )));
        }
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Connection closed inside HTTP request head",
            )
            .into());
        }
    }
}
