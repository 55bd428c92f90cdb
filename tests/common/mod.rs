//! Test utilities for Wssocks
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use wssocks::config::{AuthConfig, FrontDoor, GatewayConfig, Role, TlsConfig, TunnelConfig};
use wssocks::socks::{
    TargetAddr, SOCKS5_AUTH_METHOD_NONE, SOCKS5_CMD_TCP_CONNECT, SOCKS5_RESERVED, SOCKS5_VERSION,
};
use wssocks::Gateway;

/// Upper bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// A port on localhost with nothing listening
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Spawn a TCP server that echoes every byte back
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Path of a file under `tests/data`
pub fn test_data(name: &str) -> String {
    format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), name)
}

/// Test configuration builder
pub struct TestConfigBuilder {
    config: GatewayConfig,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        TestConfigBuilder {
            config: GatewayConfig {
                bind_addr: "127.0.0.1:0".to_string(),
                connect_timeout: 2,
                ..Default::default()
            },
        }
    }
}

impl TestConfigBuilder {
    /// Local gateway with the SOCKS front door
    pub fn local() -> Self {
        Self::default()
    }

    /// Remote gateway
    pub fn remote() -> Self {
        let mut builder = Self::default();
        builder.config.role = Role::Remote;
        builder
    }

    /// Serve HTTP CONNECT instead of SOCKS
    pub fn http(mut self) -> Self {
        self.config.front_door = FrontDoor::Http;
        self
    }

    /// Require client credentials
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.config.auth = AuthConfig::new(username, password);
        self
    }

    /// Tunnel through a remote gateway
    pub fn tunnel(mut self, uri: &str, secret: Option<&str>) -> Self {
        let mut tunnel = TunnelConfig::new(uri);
        tunnel.secret = secret.map(str::to_string);
        tunnel.skip_cert_verify = true;
        self.config.tunnel = Some(tunnel);
        self
    }

    /// Shared secret for signed connect requests (remote role)
    pub fn secret(mut self, secret: &str) -> Self {
        self.config.secret = Some(secret.to_string());
        self
    }

    /// Upgrade path prefix (remote role)
    pub fn proxy_path(mut self, path: &str) -> Self {
        self.config.proxy_path = path.to_string();
        self
    }

    /// CONNECT target prefix (HTTP front door)
    pub fn path_filter(mut self, filter: &str) -> Self {
        self.config.path_filter = Some(filter.to_string());
        self
    }

    /// Serve the tunnel over TLS with the bundled localhost certificate
    pub fn tls(mut self) -> Self {
        self.config.tls = Some(TlsConfig {
            cert: test_data("localhost.crt"),
            key: test_data("localhost.key"),
            key_password: None,
        });
        self
    }

    /// Accept SOCKS5 BIND
    pub fn allow_bind(mut self) -> Self {
        self.config.allow_bind = true;
        self
    }

    /// Build the configuration
    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

/// Running gateway; stops when dropped
pub struct TestGateway {
    /// Listening address
    pub addr: SocketAddr,
    shutdown_tx: broadcast::Sender<bool>,
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Bind and run a gateway in the background
pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    let gateway = Gateway::bind(&config).await.unwrap();
    let addr = gateway.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(gateway.run(shutdown_rx));
    TestGateway { addr, shutdown_tx }
}

/// SOCKS5 CONNECT request bytes
pub fn socks5_connect_request(target: &TargetAddr) -> Vec<u8> {
    let mut request = vec![SOCKS5_VERSION, SOCKS5_CMD_TCP_CONNECT, SOCKS5_RESERVED];
    request.extend_from_slice(&target.to_bytes());
    request
}

/// Read a SOCKS5 reply carrying an IPv4 bound address; returns (REP, address)
pub async fn read_socks5_reply(stream: &mut TcpStream) -> (u8, SocketAddr) {
    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], SOCKS5_VERSION);
    let ip = std::net::Ipv4Addr::new(reply[4], reply[5], reply[6], reply[7]);
    let port = u16::from_be_bytes([reply[8], reply[9]]);
    (reply[1], SocketAddr::from((ip, port)))
}

/// Run a no-auth SOCKS5 handshake and CONNECT; returns the reply code
pub async fn socks5_connect(gateway: SocketAddr, target: &TargetAddr) -> (TcpStream, u8) {
    let mut stream = TcpStream::connect(gateway).await.unwrap();
    stream
        .write_all(&[SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE])
        .await
        .unwrap();
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await.unwrap();
    assert_eq!(choice, [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE]);

    stream
        .write_all(&socks5_connect_request(target))
        .await
        .unwrap();
    let (code, _) = tokio::time::timeout(TEST_TIMEOUT, read_socks5_reply(&mut stream))
        .await
        .unwrap();
    (stream, code)
}

/// Write `payload` and expect it echoed back
pub async fn assert_echo(stream: &mut TcpStream, payload: &[u8]) {
    stream.write_all(payload).await.unwrap();
    let mut buf = vec![0u8; payload.len()];
    tokio::time::timeout(TEST_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(buf, payload);
}

/// Expect the peer to close within one second
pub async fn assert_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    })
    .await;
    assert!(read.is_ok(), "connection still open after 1s");
}
