//! SOCKS front door integration tests

mod common;

use common::*;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use wssocks::socks::*;
use wssocks::Socks5ReplyCode;

#[tokio::test]
async fn test_socks5_no_auth_connect() {
    let echo = spawn_echo_server().await;
    let gateway = spawn_gateway(TestConfigBuilder::local().build()).await;

    let (mut stream, code) = socks5_connect(gateway.addr, &TargetAddr::Ip(echo)).await;
    assert_eq!(code, Socks5ReplyCode::Succeeded as u8);

    assert_echo(&mut stream, b"hello through socks5").await;
}

#[tokio::test]
async fn test_socks5_domain_target() {
    let echo = spawn_echo_server().await;
    let gateway = spawn_gateway(TestConfigBuilder::local().build()).await;

    let target = TargetAddr::domain("127.0.0.1".to_string(), echo.port());
    let (mut stream, code) = socks5_connect(gateway.addr, &target).await;
    assert_eq!(code, Socks5ReplyCode::Succeeded as u8);
    assert_echo(&mut stream, b"domain").await;
}

async fn password_handshake(
    gateway: std::net::SocketAddr,
    user: &[u8],
    pass: &[u8],
) -> (TcpStream, u8) {
    let mut stream = TcpStream::connect(gateway).await.unwrap();
    stream
        .write_all(&[SOCKS5_VERSION, 2, SOCKS5_AUTH_METHOD_NONE, SOCKS5_AUTH_METHOD_PASSWORD])
        .await
        .unwrap();
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await.unwrap();
    assert_eq!(choice, [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_PASSWORD]);

    let mut auth = vec![SOCKS5_AUTH_VERSION, user.len() as u8];
    auth.extend_from_slice(user);
    auth.push(pass.len() as u8);
    auth.extend_from_slice(pass);
    stream.write_all(&auth).await.unwrap();

    let mut status = [0u8; 2];
    stream.read_exact(&mut status).await.unwrap();
    assert_eq!(status[0], SOCKS5_AUTH_VERSION);
    (stream, status[1])
}

#[tokio::test]
async fn test_socks5_password_wrong_credentials() {
    let gateway = spawn_gateway(
        TestConfigBuilder::local()
            .credentials("user", "password")
            .build(),
    )
    .await;

    let (mut stream, status) = password_handshake(gateway.addr, b"user", b"Password").await;
    assert_eq!(status, SOCKS5_AUTH_FAILURE);
    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_socks5_password_then_connect() {
    let echo = spawn_echo_server().await;
    let gateway = spawn_gateway(
        TestConfigBuilder::local()
            .credentials("user", "password")
            .build(),
    )
    .await;

    let (mut stream, status) = password_handshake(gateway.addr, b"user", b"password").await;
    assert_eq!(status, SOCKS5_AUTH_SUCCESS);

    stream
        .write_all(&socks5_connect_request(&TargetAddr::Ip(echo)))
        .await
        .unwrap();
    let (code, _) = read_socks5_reply(&mut stream).await;
    assert_eq!(code, Socks5ReplyCode::Succeeded as u8);
    assert_echo(&mut stream, b"authenticated").await;
}

#[tokio::test]
async fn test_socks5_no_auth_offer_refused_when_credentials_configured() {
    let gateway = spawn_gateway(
        TestConfigBuilder::local()
            .credentials("user", "password")
            .build(),
    )
    .await;

    let mut stream = TcpStream::connect(gateway.addr).await.unwrap();
    stream
        .write_all(&[SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE])
        .await
        .unwrap();
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await.unwrap();
    assert_eq!(choice, [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE]);
    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_socks5_dial_failure() {
    let gateway = spawn_gateway(TestConfigBuilder::local().build()).await;

    let target = TargetAddr::ipv4([127, 0, 0, 1].into(), closed_port());
    let (mut stream, code) = socks5_connect(gateway.addr, &target).await;
    assert_eq!(code, Socks5ReplyCode::ConnectionRefused as u8);
    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_socks5_udp_associate_not_supported() {
    let gateway = spawn_gateway(TestConfigBuilder::local().build()).await;

    let mut stream = TcpStream::connect(gateway.addr).await.unwrap();
    stream
        .write_all(&[SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE])
        .await
        .unwrap();
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await.unwrap();

    let mut request = vec![SOCKS5_VERSION, SOCKS5_CMD_UDP_ASSOCIATE, SOCKS5_RESERVED];
    request.extend_from_slice(&TargetAddr::ipv4([0, 0, 0, 0].into(), 0).to_bytes());
    stream.write_all(&request).await.unwrap();

    let (code, _) = read_socks5_reply(&mut stream).await;
    assert_eq!(code, Socks5ReplyCode::CommandNotSupported as u8);
    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_socks5_bind_disabled_by_default() {
    let gateway = spawn_gateway(TestConfigBuilder::local().build()).await;

    let mut stream = TcpStream::connect(gateway.addr).await.unwrap();
    stream
        .write_all(&[SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE])
        .await
        .unwrap();
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await.unwrap();

    let mut request = vec![SOCKS5_VERSION, SOCKS5_CMD_TCP_BIND, SOCKS5_RESERVED];
    request.extend_from_slice(&TargetAddr::ipv4([127, 0, 0, 1].into(), 80).to_bytes());
    stream.write_all(&request).await.unwrap();

    let (code, _) = read_socks5_reply(&mut stream).await;
    assert_eq!(code, Socks5ReplyCode::CommandNotSupported as u8);
}

#[tokio::test]
async fn test_socks5_bind_two_replies() {
    let gateway = spawn_gateway(TestConfigBuilder::local().allow_bind().build()).await;

    let mut stream = TcpStream::connect(gateway.addr).await.unwrap();
    stream
        .write_all(&[SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE])
        .await
        .unwrap();
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await.unwrap();

    let mut request = vec![SOCKS5_VERSION, SOCKS5_CMD_TCP_BIND, SOCKS5_RESERVED];
    request.extend_from_slice(&TargetAddr::ipv4([127, 0, 0, 1].into(), 0).to_bytes());
    stream.write_all(&request).await.unwrap();

    let (code, bound) = read_socks5_reply(&mut stream).await;
    assert_eq!(code, Socks5ReplyCode::Succeeded as u8);
    assert_ne!(bound.port(), 0);

    let mut inbound = TcpStream::connect(bound).await.unwrap();
    let (code, peer) = read_socks5_reply(&mut stream).await;
    assert_eq!(code, Socks5ReplyCode::Succeeded as u8);
    assert_eq!(peer, inbound.local_addr().unwrap());

    inbound.write_all(b"reverse").await.unwrap();
    let mut buf = [0u8; 7];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"reverse");
}

fn socks4_request(port: u16, ip: [u8; 4], user: &[u8], host: Option<&str>) -> Vec<u8> {
    let mut request = vec![SOCKS4_VERSION, SOCKS4_CMD_CONNECT];
    request.extend_from_slice(&port.to_be_bytes());
    request.extend_from_slice(&ip);
    request.extend_from_slice(user);
    request.push(0);
    if let Some(host) = host {
        request.extend_from_slice(host.as_bytes());
        request.push(0);
    }
    request
}

#[tokio::test]
async fn test_socks4_connect() {
    let echo = spawn_echo_server().await;
    let gateway = spawn_gateway(TestConfigBuilder::local().build()).await;

    let mut stream = TcpStream::connect(gateway.addr).await.unwrap();
    stream
        .write_all(&socks4_request(echo.port(), [127, 0, 0, 1], b"alice", None))
        .await
        .unwrap();

    let mut reply = [0u8; 8];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], SOCKS4_REPLY_VERSION);
    assert_eq!(reply[1], SOCKS4_REPLY_GRANTED);

    assert_echo(&mut stream, b"socks4").await;
}

#[tokio::test]
async fn test_socks4a_domain_connect() {
    let echo = spawn_echo_server().await;
    let gateway = spawn_gateway(TestConfigBuilder::local().build()).await;

    let mut stream = TcpStream::connect(gateway.addr).await.unwrap();
    stream
        .write_all(&socks4_request(echo.port(), [0, 0, 0, 1], b"", Some("127.0.0.1")))
        .await
        .unwrap();

    let mut reply = [0u8; 8];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], SOCKS4_REPLY_GRANTED);

    assert_echo(&mut stream, b"socks4a").await;
}

#[tokio::test]
async fn test_socks4_dial_failure_rejected() {
    let gateway = spawn_gateway(TestConfigBuilder::local().build()).await;

    let mut stream = TcpStream::connect(gateway.addr).await.unwrap();
    stream
        .write_all(&socks4_request(closed_port(), [127, 0, 0, 1], b"", None))
        .await
        .unwrap();

    let mut reply = [0u8; 8];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], SOCKS4_REPLY_REJECTED);
    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_socks4_rejected_when_credentials_configured() {
    let echo = spawn_echo_server().await;
    let gateway = spawn_gateway(
        TestConfigBuilder::local()
            .credentials("user", "password")
            .build(),
    )
    .await;

    let mut stream = TcpStream::connect(gateway.addr).await.unwrap();
    stream
        .write_all(&socks4_request(echo.port(), [127, 0, 0, 1], b"user", None))
        .await
        .unwrap();

    let mut reply = [0u8; 8];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], SOCKS4_REPLY_REJECTED);
    assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_unknown_version_closed_silently() {
    let gateway = spawn_gateway(TestConfigBuilder::local().build()).await;

    let mut stream = TcpStream::connect(gateway.addr).await.unwrap();
    stream.write_all(&[0x47]).await.unwrap();

    let mut output = Vec::new();
    tokio::time::timeout(Duration::from_secs(1), stream.read_to_end(&mut output))
        .await
        .unwrap()
        .unwrap();
    assert!(output.is_empty());
}

#[tokio::test]
async fn test_target_close_closes_client() {
    let (listener, addr) = create_test_listener().await;
    let gateway = spawn_gateway(TestConfigBuilder::local().build()).await;

    let (mut client, code) = socks5_connect(gateway.addr, &TargetAddr::Ip(addr)).await;
    assert_eq!(code, Socks5ReplyCode::Succeeded as u8);
    let (target, _) = listener.accept().await.unwrap();

    drop(target);
    assert_closed(&mut client).await;
}

#[tokio::test]
async fn test_client_close_closes_target() {
    let (listener, addr) = create_test_listener().await;
    let gateway = spawn_gateway(TestConfigBuilder::local().build()).await;

    let (client, code) = socks5_connect(gateway.addr, &TargetAddr::Ip(addr)).await;
    assert_eq!(code, Socks5ReplyCode::Succeeded as u8);
    let (mut target, _) = listener.accept().await.unwrap();

    drop(client);
    assert_closed(&mut target).await;
}
