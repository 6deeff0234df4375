//! Integration tests for the SOCKS5 server

mod common;

use async_socks5::Auth;
use common::socks5_mock::*;
use common::*;
use futures::{SinkExt, StreamExt};
use sockschain::metrics::Counter;
use sockschain::socks::consts::*;
use sockschain::socks::udp::encode_udp_datagram;
use sockschain::socks::{AddrSpec, UdpAssociateCodec};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

#[tokio::test]
async fn test_connect_and_relay() {
    let echo = spawn_tcp_echo().await;
    let server = start_server(TestConfigBuilder::new().allow_local_destination(true).build()).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    async_socks5::connect(&mut stream, echo, None).await.unwrap();

    stream.write_all(b"through the proxy").await.unwrap();
    let mut buf = [0u8; 17];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"through the proxy");
}

#[tokio::test]
async fn test_connect_with_password() {
    let echo = spawn_tcp_echo().await;
    let config = TestConfigBuilder::new()
        .credentials("alice", "secret")
        .allow_local_destination(true)
        .build();
    let server = start_server(config).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let auth = Auth {
        username: "alice".to_string(),
        password: "secret".to_string(),
    };
    async_socks5::connect(&mut stream, echo, Some(auth)).await.unwrap();

    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn test_wrong_password_is_counted() {
    let config = TestConfigBuilder::new().credentials("alice", "secret").build();
    let server = start_server(config).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let auth = Auth {
        username: "alice".to_string(),
        password: "guess".to_string(),
    };
    let target: SocketAddr = "192.0.2.1:80".parse().unwrap();
    let result = async_socks5::connect(&mut stream, target, Some(auth)).await;
    assert!(result.is_err());

    let metrics = server.metrics.clone();
    assert!(eventually(|| metrics.get(Counter::HandshakeErrors) == 1).await);
}

#[tokio::test]
async fn test_bind_is_refused() {
    let server = start_server(TestConfigBuilder::new().build()).await;

    let mut stream = connect_no_auth(server.addr).await;
    stream
        .write_all(&create_request_ipv4(SOCKS5_CMD_TCP_BIND, [10, 0, 0, 1], 80))
        .await
        .unwrap();

    let (rep, bound) = read_ipv4_reply(&mut stream).await;
    assert_eq!(rep, 0x07);
    assert_eq!(bound.to_string(), "0.0.0.0:0");

    // No relay follows the refusal
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
    assert_eq!(server.metrics.get(Counter::UnsupportedCommandErrors), 1);
}

#[tokio::test]
async fn test_unknown_command_is_refused() {
    let server = start_server(TestConfigBuilder::new().build()).await;

    let mut stream = connect_no_auth(server.addr).await;
    stream
        .write_all(&create_request_ipv4(0x7F, [10, 0, 0, 1], 80))
        .await
        .unwrap();

    let (rep, _) = read_ipv4_reply(&mut stream).await;
    assert_eq!(rep, 0x07);
    assert_eq!(server.metrics.get(Counter::UnsupportedCommandErrors), 1);
}

#[tokio::test]
async fn test_connect_to_refused_port() {
    let (listener, closed) = create_test_listener().await;
    drop(listener);

    let server = start_server(TestConfigBuilder::new().allow_local_destination(true).build()).await;
    let mut stream = connect_no_auth(server.addr).await;
    stream
        .write_all(&create_request_ipv4(
            SOCKS5_CMD_TCP_CONNECT,
            [127, 0, 0, 1],
            closed.port(),
        ))
        .await
        .unwrap();

    let (rep, _) = read_ipv4_reply(&mut stream).await;
    assert_eq!(rep, 0x05);
    assert_eq!(server.metrics.get(Counter::ConnectionRefusedErrors), 1);
    assert_eq!(server.metrics.get(Counter::HostUnreachableErrors), 0);
}

#[tokio::test]
async fn test_localhost_rejected_by_default() {
    let echo = spawn_tcp_echo().await;
    let server = start_server(TestConfigBuilder::new().build()).await;

    let mut stream = connect_no_auth(server.addr).await;
    stream
        .write_all(&create_request_ipv4(
            SOCKS5_CMD_TCP_CONNECT,
            [127, 0, 0, 1],
            echo.port(),
        ))
        .await
        .unwrap();

    let (rep, _) = read_ipv4_reply(&mut stream).await;
    assert_eq!(rep, 0x02);
}

#[tokio::test]
async fn test_unresolvable_domain() {
    let server = start_server(TestConfigBuilder::new().build()).await;

    let mut stream = connect_no_auth(server.addr).await;
    stream
        .write_all(&create_connect_domain("does-not-exist.invalid", 443))
        .await
        .unwrap();

    let (rep, _) = read_ipv4_reply(&mut stream).await;
    assert_eq!(rep, 0x04);
    assert_eq!(server.metrics.get(Counter::DnsResolveErrors), 1);
}

#[tokio::test]
async fn test_udp_associate_round_trip() {
    let echo = spawn_udp_echo().await;
    let server = start_server(TestConfigBuilder::new().build()).await;

    let mut stream = connect_no_auth(server.addr).await;
    stream
        .write_all(&create_request_ipv4(SOCKS5_CMD_UDP_ASSOCIATE, [0, 0, 0, 0], 0))
        .await
        .unwrap();

    let (rep, bound) = read_ipv4_reply(&mut stream).await;
    assert_eq!(rep, 0x00);
    assert!(bound.ip().is_unspecified());
    assert_ne!(bound.port(), 0);

    let mut tunnel = Framed::new(stream, UdpAssociateCodec::new());
    let datagram = encode_udp_datagram(&AddrSpec::from(echo), b"dns-query").unwrap();
    tunnel.send(datagram.freeze()).await.unwrap();

    let answer = tokio::time::timeout(Duration::from_secs(2), tunnel.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(&answer[..], b"dns-query");

    // A fragmented datagram ends the session
    let mut fragmented = encode_udp_datagram(&AddrSpec::from(echo), b"frag").unwrap();
    fragmented[2] = 0x01;
    tunnel.send(fragmented.freeze()).await.unwrap();
    let closed = tokio::time::timeout(Duration::from_secs(2), tunnel.next())
        .await
        .unwrap();
    assert!(closed.is_none());

    let metrics = server.metrics.clone();
    assert_eq!(metrics.get(Counter::UdpAssociateOutPkts), 1);
    assert_eq!(metrics.get(Counter::UdpAssociateInPkts), 1);
    assert_eq!(metrics.get(Counter::UdpAssociateInBytes), 9);
    assert_eq!(metrics.get(Counter::UdpAssociateErrors), 1);
}

#[tokio::test]
async fn test_udp_tunnel_rejects_garbage_frame() {
    let server = start_server(TestConfigBuilder::new().build()).await;

    let mut stream = connect_no_auth(server.addr).await;
    stream
        .write_all(&create_request_ipv4(SOCKS5_CMD_UDP_ASSOCIATE, [0, 0, 0, 0], 0))
        .await
        .unwrap();
    let (rep, _) = read_ipv4_reply(&mut stream).await;
    assert_eq!(rep, 0x00);

    // Not a datagram frame
    stream.write_all(&[0x42, 0x00, 0x01, 0x00, 0xFF]).await.unwrap();
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());

    let metrics = server.metrics.clone();
    assert!(eventually(|| metrics.get(Counter::UdpAssociateErrors) == 1).await);
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let server = start_server(TestConfigBuilder::new().build()).await;
    server.shutdown_tx.send(true).unwrap();

    let addr = server.addr;
    let mut refused = false;
    for _ in 0..100 {
        if TcpStream::connect(addr).await.is_err() {
            refused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(refused);
}
