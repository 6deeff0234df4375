//! Test utilities for Sockschain
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use sockschain::config::SocksConfig;
use sockschain::metrics::CounterSet;
use sockschain::socks::{ChainForwarder, Socks5Server};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// TCP server that echoes everything back on every accepted connection
pub async fn spawn_tcp_echo() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// UDP server that echoes every datagram back to its sender
pub async fn spawn_udp_echo() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 65535];
        while let Ok((n, from)) = socket.recv_from(&mut buf).await {
            let _ = socket.send_to(&buf[..n], from).await;
        }
    });
    addr
}

/// A running SOCKS5 server bound to loopback
pub struct TestServer {
    /// Listening address
    pub addr: SocketAddr,
    /// Counters recorded by the server
    pub metrics: Arc<CounterSet>,
    /// Dropping or signalling stops the accept loop
    pub shutdown_tx: broadcast::Sender<bool>,
}

/// Start a SOCKS5 server with `config`
pub async fn start_server(config: SocksConfig) -> TestServer {
    let (listener, addr) = create_test_listener().await;
    let metrics = Arc::new(CounterSet::new());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let server = Socks5Server::new(config).with_metrics(metrics.clone());
    tokio::spawn(Arc::new(server).run(listener, shutdown_rx));

    TestServer {
        addr,
        metrics,
        shutdown_tx,
    }
}

/// Start a chain forwarder in front of `upstream`
pub async fn start_chain(upstream: SocketAddr) -> (SocketAddr, broadcast::Sender<bool>) {
    let (listener, addr) = create_test_listener().await;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let forwarder = ChainForwarder::new(upstream.to_string());
    tokio::spawn(Arc::new(forwarder).run(listener, shutdown_rx));

    (addr, shutdown_tx)
}

/// Connect to `proxy` and complete a no-auth method negotiation
pub async fn connect_no_auth(proxy: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut method = [0u8; 2];
    stream.read_exact(&mut method).await.unwrap();
    assert_eq!(method, [0x05, 0x00]);
    stream
}

/// Read a reply whose bound address is IPv4; returns (REP, bound address)
pub async fn read_ipv4_reply(stream: &mut TcpStream) -> (u8, SocketAddr) {
    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], 0x05);
    assert_eq!(reply[3], 0x01, "expected an IPv4 bound address");
    let ip = std::net::Ipv4Addr::new(reply[4], reply[5], reply[6], reply[7]);
    let port = u16::from_be_bytes([reply[8], reply[9]]);
    (reply[1], SocketAddr::from((ip, port)))
}

/// Test configuration builder
#[derive(Default)]
pub struct TestConfigBuilder {
    credentials: Option<(String, String)>,
    allow_local_destination: bool,
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Require username/password authentication
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// Allow loopback destinations
    pub fn allow_local_destination(mut self, allow: bool) -> Self {
        self.allow_local_destination = allow;
        self
    }

    /// Build the configuration
    pub fn build(self) -> SocksConfig {
        let (username, password) = match self.credentials.clone() {
            Some((username, password)) => (Some(username), Some(password)),
            None => (None, None),
        };
        SocksConfig {
            auth_required: self.credentials.is_some(),
            username,
            password,
            allow_local_destination: self.allow_local_destination,
            request_timeout: 5,
        }
    }
}

/// Mock SOCKS5 request data
pub mod socks5_mock {
    use sockschain::socks::consts::*;

    /// Request to an IPv4 address with the given command
    pub fn create_request_ipv4(command: u8, ip: [u8; 4], port: u16) -> Vec<u8> {
        let mut cmd = vec![SOCKS5_VERSION, command, SOCKS5_RESERVED, SOCKS5_ADDR_TYPE_IPV4];
        cmd.extend_from_slice(&ip);
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }

    /// CONNECT request to a domain
    pub fn create_connect_domain(domain: &str, port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            domain.len() as u8,
        ];
        cmd.extend_from_slice(domain.as_bytes());
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }
}

/// Poll `condition` until it holds or a second has passed
pub async fn eventually<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    condition()
}
