//! Gateway configuration types
//!
//! Defines the main configuration structures for a gateway listener.

use super::{TcpConfig, TlsConfig, TunnelConfig};
use crate::error::GatewayError;
use crate::helper::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_HANDSHAKE_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_bind_addr() -> String {
    "127.0.0.1:1080".to_string()
}

fn default_proxy_path() -> String {
    "/".to_string()
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_handshake_timeout() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_SECS
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Gateway configuration
    pub gateway: GatewayConfig,
}

/// Which side of the tunnel this process plays
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Client-facing side: accepts SOCKS or HTTP CONNECT from applications
    #[default]
    Local,
    /// Relay side: accepts WebSocket upgrades and dials targets
    Remote,
}

/// Client-facing protocol surface of a local gateway
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FrontDoor {
    /// SOCKS4, SOCKS4a and SOCKS5, selected by the version byte
    #[default]
    Socks,
    /// HTTP CONNECT
    Http,
}

/// Gateway configuration, immutable for the lifetime of a listener
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Local or remote role
    #[serde(default)]
    pub role: Role,

    /// Listener bind address (e.g., "127.0.0.1:1080")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Front door for the local role
    #[serde(default)]
    pub front_door: FrontDoor,

    /// Username/password required from clients of the local role
    #[serde(default)]
    pub auth: AuthConfig,

    /// Upstream WebSocket tunnel; targets are dialed directly when absent
    #[serde(default)]
    pub tunnel: Option<TunnelConfig>,

    /// TLS material for the remote role's listener
    #[serde(default)]
    pub tls: Option<TlsConfig>,

    /// Shared secret expected from tunnel clients (remote role)
    #[serde(default)]
    pub secret: Option<String>,

    /// WebSocket upgrade path prefix, matched on whole segments (remote role)
    #[serde(default = "default_proxy_path")]
    pub proxy_path: String,

    /// Path prefix accepted by the HTTP front door
    #[serde(default)]
    pub path_filter: Option<String>,

    /// Outbound connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Front-door handshake idle timeout in seconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,

    /// Accept the SOCKS5 BIND command
    #[serde(default)]
    pub allow_bind: bool,

    /// Socket options for accepted and dialed connections
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            role: Role::default(),
            bind_addr: default_bind_addr(),
            front_door: FrontDoor::default(),
            auth: AuthConfig::default(),
            tunnel: None,
            tls: None,
            secret: None,
            proxy_path: default_proxy_path(),
            path_filter: None,
            connect_timeout: default_connect_timeout(),
            handshake_timeout: default_handshake_timeout(),
            allow_bind: false,
            tcp: TcpConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Outbound connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Front-door handshake timeout
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), GatewayError> {
        self.auth.validate()?;

        if let Some(tunnel) = &self.tunnel {
            tunnel.validate()?;
        }

        match self.role {
            Role::Remote => {
                if self.front_door == FrontDoor::Http {
                    return Err(GatewayError::Config(
                        "The remote role does not serve an HTTP front door".to_string(),
                    ));
                }
                if !self.proxy_path.starts_with('/') {
                    return Err(GatewayError::Config(format!(
                        "proxy_path must start with '/': {}",
                        self.proxy_path
                    )));
                }
                if let Some(tls) = &self.tls {
                    tls.validate()?;
                }
            }
            Role::Local => {
                if self.tls.is_some() {
                    return Err(GatewayError::Config(
                        "Server TLS material is only used by the remote role".to_string(),
                    ));
                }
            }
        }

        if self.connect_timeout == 0 {
            return Err(GatewayError::Config(
                "connect_timeout must be greater than zero".to_string(),
            ));
        }
        if self.handshake_timeout == 0 {
            return Err(GatewayError::Config(
                "handshake_timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Client credentials for SOCKS5 password and HTTP Basic proxy authentication
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    /// Username
    #[serde(default)]
    pub username: Option<String>,

    /// Password
    #[serde(default)]
    pub password: Option<String>,
}

impl AuthConfig {
    /// Build credentials from a username/password pair
    pub fn new(username: &str, password: &str) -> Self {
        AuthConfig {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
        }
    }

    /// Check if authentication credentials are configured
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Byte-for-byte, case-sensitive credential comparison
    pub fn matches(&self, username: &[u8], password: &[u8]) -> bool {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => u.as_bytes() == username && p.as_bytes() == password,
            _ => false,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.username.is_some() != self.password.is_some() {
            return Err(GatewayError::Config(
                "Both username and password must be configured".to_string(),
            ));
        }
        for value in [&self.username, &self.password].into_iter().flatten() {
            if value.is_empty() || value.len() > 255 {
                return Err(GatewayError::Config(
                    "Credentials must be between 1 and 255 bytes".to_string(),
                ));
            }
        }
        Ok(())
    }
}
