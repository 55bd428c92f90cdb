//! Transport configuration types
//!
//! Defines configuration for TCP socket options, the upstream WebSocket
//! tunnel and the remote role's TLS material.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Default keepalive seconds
fn default_keepalive_secs() -> u64 {
    20
}

/// Default keepalive interval
fn default_keepalive_interval() -> u64 {
    8
}

fn default_nodelay() -> bool {
    true
}

/// TCP transport configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TcpConfig {
    /// Enable TCP_NODELAY
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,

    /// TCP keepalive timeout in seconds
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// TCP keepalive interval in seconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            nodelay: default_nodelay(),
            keepalive_secs: default_keepalive_secs(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}

/// Upstream WebSocket tunnel used by the local role
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TunnelConfig {
    /// Tunnel URI, `ws://host:port/path` or `wss://host:port/path`
    pub uri: String,

    /// Shared secret used to sign connect requests
    #[serde(default)]
    pub secret: Option<String>,

    /// Skip server certificate verification for `wss://`
    #[serde(default)]
    pub skip_cert_verify: bool,

    /// Extra PEM file with trusted roots for `wss://`
    #[serde(default)]
    pub trusted_root: Option<String>,
}

impl TunnelConfig {
    /// Build a tunnel configuration for the given URI
    pub fn new(uri: &str) -> Self {
        TunnelConfig {
            uri: uri.to_string(),
            secret: None,
            skip_cert_verify: false,
            trusted_root: None,
        }
    }

    /// Parse the tunnel URI
    pub fn url(&self) -> Result<Url, GatewayError> {
        Url::parse(&self.uri)
            .map_err(|e| GatewayError::Config(format!("Invalid tunnel uri {}: {}", self.uri, e)))
    }

    /// Whether the tunnel runs over TLS
    pub fn is_secure(&self) -> bool {
        self.url().map(|url| url.scheme() == "wss").unwrap_or(false)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), GatewayError> {
        let url = self.url()?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(GatewayError::Config(format!(
                    "Unsupported tunnel scheme '{}', expected ws or wss",
                    other
                )))
            }
        }
        if url.host_str().is_none() {
            return Err(GatewayError::Config(format!(
                "Tunnel uri has no host: {}",
                self.uri
            )));
        }
        Ok(())
    }
}

/// TLS material for the remote role's listener
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TlsConfig {
    /// PEM certificate chain path
    pub cert: String,

    /// PEM private key path
    pub key: String,

    /// Private key password
    #[serde(default)]
    pub key_password: Option<String>,
}

impl TlsConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.cert.is_empty() || self.key.is_empty() {
            return Err(GatewayError::Config(
                "Both tls.cert and tls.key must be configured".to_string(),
            ));
        }
        if self.key_password.as_deref().is_some_and(|p| !p.is_empty()) {
            return Err(GatewayError::Config(
                "Encrypted private keys are not supported; provide an unencrypted PEM key"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
