//! UDP ASSOCIATE handler
//!
//! Binds an ephemeral UDP socket, answers the client with its port and
//! then runs two pumps until either side of the session ends:
//!
//! - outbound: tunnel frame -> strip UDP request header -> UDP socket
//! - inbound: UDP socket -> tunnel frame, payload forwarded verbatim
//!
//! Frames travel over the control connection using [`UdpAssociateCodec`].

use super::header::parse_udp_datagram;
use super::session::UdpSession;
use super::tunnel::UdpAssociateCodec;
use crate::error::{ReplyCode, Socks5Error};
use crate::metrics::{Counter, Socks5Metrics};
use crate::socks::command::send_reply;
use crate::socks::consts::MAX_UDP_PACKET;
use crate::socks::resolver::{RequestScope, Resolver};
use crate::socks::types::AddrSpec;
use bytes::{Bytes, BytesMut};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UdpSocket;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace};

/// Handle a UDP ASSOCIATE request on `conn`.
///
/// Replies success with `0.0.0.0:<port>` once the socket is bound, or
/// server failure if binding fails. Each destination name is resolved
/// within `resolve_timeout`.
pub async fn handle_associate<S>(
    mut conn: S,
    resolver: &dyn Resolver,
    resolve_timeout: Duration,
    metrics: &dyn Socks5Metrics,
) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let socket = match bind_relay_socket().await {
        Ok(socket) => socket,
        Err(e) => {
            metrics.record(Counter::UdpAssociateErrors);
            if let Err(reply_err) = send_reply(&mut conn, ReplyCode::ServerFailure, None).await {
                metrics.record(Counter::HandshakeErrors);
                debug!("Failed to send failure reply: {}", reply_err);
            }
            return Err(e.into());
        }
    };

    let port = socket.local_addr()?.port();
    let bind_addr = AddrSpec::from_ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    if let Err(e) = send_reply(&mut conn, ReplyCode::Succeeded, Some(&bind_addr)).await {
        metrics.record(Counter::HandshakeErrors);
        return Err(e);
    }

    info!("UDP ASSOCIATE established on port {}", port);

    let (tunnel_tx, tunnel_rx) = Framed::new(conn, UdpAssociateCodec::new()).split();
    let result = run_udp_relay(
        &socket,
        tunnel_rx,
        tunnel_tx,
        resolver,
        resolve_timeout,
        metrics,
    )
    .await;

    info!("UDP ASSOCIATE session on port {} ended", port);
    result
}

/// Bind the relay socket on the IPv6 wildcard so both families can be
/// reached, or on `0.0.0.0` where IPv6 is unavailable.
async fn bind_relay_socket() -> io::Result<UdpSocket> {
    match UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0)).await {
        Ok(socket) => Ok(socket),
        Err(e) => {
            debug!("IPv6 UDP bind failed, falling back to IPv4: {}", e);
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await
        }
    }
}

/// Pump datagrams between `socket` and a framed tunnel until one
/// direction ends.
///
/// Returns the first error either pump hit. A tunnel that simply closes
/// ends the session without error.
pub async fn run_udp_relay<R, W>(
    socket: &UdpSocket,
    tunnel_rx: R,
    tunnel_tx: W,
    resolver: &dyn Resolver,
    resolve_timeout: Duration,
    metrics: &dyn Socks5Metrics,
) -> Result<(), Socks5Error>
where
    R: Stream<Item = io::Result<BytesMut>> + Unpin,
    W: Sink<Bytes, Error = io::Error> + Unpin,
{
    let session = UdpSession::new();
    let outbound = Outbound {
        socket,
        dual_stack: socket.local_addr()?.is_ipv6(),
        resolver,
        resolve_timeout,
    };

    tokio::join!(
        async {
            let result = outbound_pump(&session, &outbound, tunnel_rx, metrics).await;
            finish_pump(&session, "outbound", result);
        },
        async {
            let result = inbound_pump(&session, socket, tunnel_tx, metrics).await;
            finish_pump(&session, "inbound", result);
        },
    );

    session.into_result()
}

fn finish_pump(session: &UdpSession, direction: &str, result: Result<(), Socks5Error>) {
    match result {
        Ok(()) => {
            trace!("UDP {} pump finished", direction);
            session.close();
        }
        Err(e) => {
            debug!("UDP {} pump failed: {}", direction, e);
            session.fail(e);
        }
    }
}

/// Where and how the outbound pump sends datagrams
struct Outbound<'a> {
    socket: &'a UdpSocket,
    /// IPv4 destinations must be written as mapped IPv6 addresses
    dual_stack: bool,
    resolver: &'a dyn Resolver,
    resolve_timeout: Duration,
}

impl Outbound<'_> {
    async fn forward(&self, dest: &AddrSpec, payload: &[u8]) -> Result<usize, Socks5Error> {
        let target = match dest.socket_addr() {
            Some(addr) => addr,
            None => {
                let host = dest
                    .fqdn
                    .as_deref()
                    .ok_or_else(|| Socks5Error::InvalidAddress(dest.to_string()))?;
                let scope = RequestScope::with_timeout(self.resolve_timeout);
                let (_, ip) = self.resolver.resolve(scope, host).await.map_err(|source| {
                    Socks5Error::ResolutionFailure {
                        host: host.to_string(),
                        source,
                    }
                })?;
                SocketAddr::new(ip, dest.port)
            }
        };
        let target = match target {
            SocketAddr::V4(v4) if self.dual_stack => {
                SocketAddr::new(IpAddr::V6(v4.ip().to_ipv6_mapped()), v4.port())
            }
            target => target,
        };

        let n = self.socket.send_to(payload, target).await?;
        trace!("UDP relay: sent {} bytes to {}", n, target);
        Ok(n)
    }
}

async fn outbound_pump<R>(
    session: &UdpSession,
    outbound: &Outbound<'_>,
    mut tunnel_rx: R,
    metrics: &dyn Socks5Metrics,
) -> Result<(), Socks5Error>
where
    R: Stream<Item = io::Result<BytesMut>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = session.closed() => return Ok(()),
            frame = tunnel_rx.next() => frame,
        };

        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                metrics.record(Counter::UdpAssociateErrors);
                return Err(e.into());
            }
            None => {
                debug!("UDP tunnel closed by client");
                return Ok(());
            }
        };

        // A broken header means the client is not speaking the protocol
        let datagram = match parse_udp_datagram(&frame) {
            Ok(datagram) => datagram,
            Err(e) => {
                metrics.record(Counter::UdpAssociateErrors);
                return Err(e);
            }
        };

        let forwarded = tokio::select! {
            _ = session.closed() => return Ok(()),
            sent = outbound.forward(&datagram.dest, datagram.payload) => sent,
        };

        match forwarded {
            Ok(n) => {
                metrics.record(Counter::UdpAssociateOutPkts);
                metrics.incr(Counter::UdpAssociateOutBytes, n as u64);
            }
            Err(e) => {
                metrics.record(Counter::UdpAssociateErrors);
                debug!("Dropping UDP datagram to {}: {}", datagram.dest, e);
            }
        }
    }
}

async fn inbound_pump<W>(
    session: &UdpSession,
    socket: &UdpSocket,
    mut tunnel_tx: W,
    metrics: &dyn Socks5Metrics,
) -> Result<(), Socks5Error>
where
    W: Sink<Bytes, Error = io::Error> + Unpin,
{
    let mut buf = vec![0u8; MAX_UDP_PACKET];

    loop {
        let received = tokio::select! {
            _ = session.closed() => return Ok(()),
            received = socket.recv_from(&mut buf) => received,
        };

        let (n, from) = match received {
            Ok(received) => received,
            Err(e) => {
                metrics.record(Counter::UdpAssociateErrors);
                return Err(e.into());
            }
        };
        trace!("UDP relay: received {} bytes from {}", n, from);

        let sent = tokio::select! {
            _ = session.closed() => return Ok(()),
            sent = tunnel_tx.send(Bytes::copy_from_slice(&buf[..n])) => sent,
        };

        if let Err(e) = sent {
            metrics.record(Counter::UdpAssociateErrors);
            return Err(e.into());
        }

        metrics.record(Counter::UdpAssociateInPkts);
        metrics.incr(Counter::UdpAssociateInBytes, n as u64);
    }
}
