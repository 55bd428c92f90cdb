//! Error types for Wssocks
//!
//! This module defines the error taxonomy shared by every front door and by
//! the tunnel control protocol.

use std::io;
use thiserror::Error;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or unsupported frame; always fatal for the connection
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Credential or HMAC mismatch
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Target (or tunnel relay) could not be reached
    #[error("Dial error: {message}")]
    Dial {
        /// Human readable description
        message: String,
        /// Underlying IO error kind, when known
        kind: Option<io::ErrorKind>,
    },

    /// Peer reset or IO failure on an established relay
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid configuration; fails startup, never a single connection
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// WebSocket library error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// Build a dial failure from an IO error
    pub fn dial(target: impl std::fmt::Display, err: &io::Error) -> Self {
        GatewayError::Dial {
            message: format!("{}: {}", target, err),
            kind: Some(err.kind()),
        }
    }

    /// Build a dial failure without an IO cause (e.g. tunnel refused the request)
    pub fn dial_refused(message: impl Into<String>) -> Self {
        GatewayError::Dial {
            message: message.into(),
            kind: None,
        }
    }

    /// Whether this error is a dial failure
    pub fn is_dial(&self) -> bool {
        matches!(self, GatewayError::Dial { .. } | GatewayError::Timeout(_))
    }
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Socks5ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl From<Socks5ReplyCode> for u8 {
    fn from(code: Socks5ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for Socks5ReplyCode {
    type Error = GatewayError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Socks5ReplyCode::Succeeded),
            0x01 => Ok(Socks5ReplyCode::GeneralFailure),
            0x02 => Ok(Socks5ReplyCode::ConnectionNotAllowed),
            0x03 => Ok(Socks5ReplyCode::NetworkUnreachable),
            0x04 => Ok(Socks5ReplyCode::HostUnreachable),
            0x05 => Ok(Socks5ReplyCode::ConnectionRefused),
            0x06 => Ok(Socks5ReplyCode::TtlExpired),
            0x07 => Ok(Socks5ReplyCode::CommandNotSupported),
            0x08 => Ok(Socks5ReplyCode::AddressTypeNotSupported),
            _ => Err(GatewayError::Protocol(format!(
                "Unknown SOCKS5 reply code: {}",
                value
            ))),
        }
    }
}

impl From<io::ErrorKind> for Socks5ReplyCode {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::ConnectionRefused => Socks5ReplyCode::ConnectionRefused,
            io::ErrorKind::TimedOut => Socks5ReplyCode::HostUnreachable,
            io::ErrorKind::AddrNotAvailable => Socks5ReplyCode::HostUnreachable,
            io::ErrorKind::PermissionDenied => Socks5ReplyCode::ConnectionNotAllowed,
            _ => Socks5ReplyCode::GeneralFailure,
        }
    }
}

impl From<&GatewayError> for Socks5ReplyCode {
    fn from(err: &GatewayError) -> Self {
        match err {
            GatewayError::Dial {
                kind: Some(kind), ..
            } => Socks5ReplyCode::from(*kind),
            GatewayError::Timeout(_) => Socks5ReplyCode::HostUnreachable,
            GatewayError::Io(e) => Socks5ReplyCode::from(e.kind()),
            _ => Socks5ReplyCode::GeneralFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks5_reply_code_round_trip() {
        for code in 0x00..=0x08u8 {
            let reply = Socks5ReplyCode::try_from(code).unwrap();
            assert_eq!(u8::from(reply), code);
        }
    }

    #[test]
    fn test_socks5_reply_code_from_u8_invalid() {
        assert!(Socks5ReplyCode::try_from(0xFF).is_err());
        assert!(Socks5ReplyCode::try_from(0x09).is_err());
    }

    #[test]
    fn test_socks5_reply_code_from_io_error_kind() {
        assert_eq!(
            Socks5ReplyCode::from(io::ErrorKind::ConnectionRefused),
            Socks5ReplyCode::ConnectionRefused
        );
        assert_eq!(
            Socks5ReplyCode::from(io::ErrorKind::TimedOut),
            Socks5ReplyCode::HostUnreachable
        );
        assert_eq!(
            Socks5ReplyCode::from(io::ErrorKind::AddrNotAvailable),
            Socks5ReplyCode::HostUnreachable
        );
        assert_eq!(
            Socks5ReplyCode::from(io::ErrorKind::PermissionDenied),
            Socks5ReplyCode::ConnectionNotAllowed
        );
        assert_eq!(
            Socks5ReplyCode::from(io::ErrorKind::Other),
            Socks5ReplyCode::GeneralFailure
        );
    }

    #[test]
    fn test_socks5_reply_code_from_gateway_error() {
        let err = GatewayError::dial(
            "127.0.0.1:9",
            &io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert_eq!(Socks5ReplyCode::from(&err), Socks5ReplyCode::ConnectionRefused);

        let err = GatewayError::Timeout("connect".to_string());
        assert_eq!(Socks5ReplyCode::from(&err), Socks5ReplyCode::HostUnreachable);

        let err = GatewayError::dial_refused("tunnel said failure");
        assert_eq!(Socks5ReplyCode::from(&err), Socks5ReplyCode::GeneralFailure);
    }

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::Config("invalid config".to_string());
        assert_eq!(format!("{}", err), "Configuration error: invalid config");

        let err = GatewayError::Protocol("bad frame".to_string());
        assert_eq!(format!("{}", err), "Protocol error: bad frame");

        let err = GatewayError::Auth("token mismatch".to_string());
        assert_eq!(format!("{}", err), "Authentication error: token mismatch");

        let err = GatewayError::dial_refused("example.com:80 rejected");
        assert_eq!(format!("{}", err), "Dial error: example.com:80 rejected");

        let err = GatewayError::Timeout("connect".to_string());
        assert_eq!(format!("{}", err), "Timeout: connect");
    }

    #[test]
    fn test_gateway_error_is_dial() {
        assert!(GatewayError::dial_refused("x").is_dial());
        assert!(GatewayError::Timeout("x".to_string()).is_dial());
        assert!(!GatewayError::Protocol("x".to_string()).is_dial());
    }

    #[test]
    fn test_gateway_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::Other, "io error");
        let err: GatewayError = io_err.into();
        assert!(matches!(err, GatewayError::Io(_)));
    }
}
