//! Tunnel control message definitions
//!
//! Control messages travel as JSON in WebSocket text frames. Binary frames
//! are reserved for relayed payload.

use super::digest::Nonce;
use serde::{Deserialize, Serialize};
use std::fmt;

/// WebSocket subprotocol identifying the tunnel control channel
pub const TUNNEL_SUBPROTOCOL: &str = "wssocks";

/// Message kind
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Server greeting, optionally carrying the nonce
    Hello,
    /// Client request
    Request,
    /// Server response
    Response,
}

/// Message action
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// `hello` carries a nonce and connect requests must be signed
    Hs256,
    /// Open a connection to `address:port`
    Connect,
    /// Liveness check
    Echo,
    /// Target connected
    Success,
    /// Target unreachable
    Failure,
    /// Token mismatch
    Reject,
    /// Anything this implementation does not know
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Hs256 => "hs256",
            Action::Connect => "connect",
            Action::Echo => "echo",
            Action::Success => "success",
            Action::Failure => "failure",
            Action::Reject => "reject",
            Action::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A single tunnel control message
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    /// Message kind
    #[serde(rename = "type")]
    pub kind: MessageType,

    /// Message action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,

    /// Nonce (hello) or HMAC token (connect request)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Destination host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Destination port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl ControlMessage {
    fn new(kind: MessageType, action: Option<Action>) -> Self {
        ControlMessage {
            kind,
            action,
            token: None,
            address: None,
            port: None,
        }
    }

    /// `{"type":"hello"}`
    pub fn hello() -> Self {
        Self::new(MessageType::Hello, None)
    }

    /// `{"type":"hello","action":"hs256","token":"<base64 nonce>"}`
    pub fn hello_hs256(nonce: &Nonce) -> Self {
        ControlMessage {
            token: Some(nonce.to_base64()),
            ..Self::new(MessageType::Hello, Some(Action::Hs256))
        }
    }

    /// Connect request; `token` is omitted when no secret is configured
    pub fn connect(address: &str, port: u16, token: Option<String>) -> Self {
        ControlMessage {
            token,
            address: Some(address.to_string()),
            port: Some(port),
            ..Self::new(MessageType::Request, Some(Action::Connect))
        }
    }

    /// `{"type":"request","action":"echo"}`
    pub fn echo_request() -> Self {
        Self::new(MessageType::Request, Some(Action::Echo))
    }

    /// Echo answer; destination fields of the request are reflected verbatim
    pub fn echo_response(request: &ControlMessage) -> Self {
        ControlMessage {
            address: request.address.clone(),
            port: request.port,
            ..Self::new(MessageType::Response, Some(Action::Echo))
        }
    }

    /// `{"type":"response","action":<action>}`
    pub fn response(action: Action) -> Self {
        Self::new(MessageType::Response, Some(action))
    }

    /// Whether the message has the given kind and action
    pub fn is(&self, kind: MessageType, action: Action) -> bool {
        self.kind == kind && self.action == Some(action)
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(action) = self.action {
            write!(f, "/{}", action)?;
        }
        if let (Some(address), Some(port)) = (&self.address, self.port) {
            write!(f, " {}:{}", address, port)?;
        }
        Ok(())
    }
}
