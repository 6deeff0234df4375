//! Chain forwarder
//!
//! Sits between a local SOCKS5 client and an upstream SOCKS5 server. The
//! handshake and the connection request are replayed byte for byte; the
//! only rewrite is the bind port of an ASSOCIATE reply, which is replaced
//! by the port of a UDP socket owned by the forwarder. Local datagrams
//! received on that socket are then carried to the upstream server over
//! the framed control connection.

use super::addr::copy_addr_body;
use super::consts::*;
use super::tcp_relay::relay_tcp;
use super::types::Command;
use super::udp::{UdpAssociateCodec, UdpSession};
use crate::error::Socks5Error;
use crate::metrics::{Counter, MetricsRecorder, Socks5Metrics};
use anyhow::{Context, Result};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{broadcast, watch};
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

/// Replay the method negotiation from `downstream` to `upstream`.
///
/// When the upstream server picks username/password, the RFC 1929
/// sub-negotiation is relayed as well.
pub async fn forward_auth<D, U>(downstream: &mut D, upstream: &mut U) -> Result<(), Socks5Error>
where
    D: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let version = downstream.read_u8().await?;
    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version));
    }

    let num_methods = downstream.read_u8().await?;
    let mut auth_req = vec![0u8; 2 + num_methods as usize];
    auth_req[0] = version;
    auth_req[1] = num_methods;
    downstream.read_exact(&mut auth_req[2..]).await?;
    upstream.write_all(&auth_req).await?;
    upstream.flush().await?;

    let mut auth_resp = [0u8; 2];
    upstream.read_exact(&mut auth_resp).await?;
    downstream.write_all(&auth_resp).await?;
    downstream.flush().await?;

    if auth_resp[1] == SOCKS5_AUTH_METHOD_PASSWORD {
        forward_password_auth(downstream, upstream).await?;
    }

    Ok(())
}

async fn forward_password_auth<D, U>(downstream: &mut D, upstream: &mut U) -> Result<(), Socks5Error>
where
    D: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    // VER ULEN UNAME PLEN PASSWD
    let mut auth_req = vec![downstream.read_u8().await?];
    for _ in 0..2 {
        let len = downstream.read_u8().await?;
        auth_req.push(len);
        let start = auth_req.len();
        auth_req.resize(start + len as usize, 0);
        downstream.read_exact(&mut auth_req[start..]).await?;
    }
    upstream.write_all(&auth_req).await?;
    upstream.flush().await?;

    let mut status = [0u8; 2];
    upstream.read_exact(&mut status).await?;
    downstream.write_all(&status).await?;
    downstream.flush().await?;

    Ok(())
}

/// Replay the connection request and its reply.
///
/// For ASSOCIATE a local UDP socket is bound and its port written over
/// the last two bytes of the reply before it reaches `downstream`; the
/// socket is returned to the caller.
pub async fn forward_connection_request<D, U>(
    downstream: &mut D,
    upstream: &mut U,
) -> Result<Option<UdpSocket>, Socks5Error>
where
    D: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    // VER CMD RSV ATYP
    let mut conn_req = vec![0u8; 4];
    downstream.read_exact(&mut conn_req).await?;
    let command = Command::from(conn_req[1]);
    let req_addr_type = conn_req[3];
    copy_addr_body(downstream, req_addr_type, &mut conn_req).await?;
    upstream.write_all(&conn_req).await?;
    upstream.flush().await?;

    // VER REP RSV ATYP
    let mut conn_resp = vec![0u8; 4];
    upstream.read_exact(&mut conn_resp).await?;
    let resp_addr_type = conn_resp[3];
    copy_addr_body(upstream, resp_addr_type, &mut conn_resp).await?;

    let udp_socket = if command == Command::Associate {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        let port = socket.local_addr()?.port().to_be_bytes();
        let len = conn_resp.len();
        conn_resp[len - 2..].copy_from_slice(&port);
        Some(socket)
    } else {
        None
    };

    downstream.write_all(&conn_resp).await?;
    downstream.flush().await?;

    Ok(udp_socket)
}

/// Relay datagrams between a local UDP socket and an upstream tunnel.
///
/// Datagrams from the local application are framed unchanged onto
/// `upstream`; frames from `upstream` go back to whichever application
/// address sent the most recent datagram. The session ends when the
/// downstream control connection closes or either direction fails.
pub async fn relay_chained_udp<D, U>(
    downstream: D,
    upstream: U,
    socket: UdpSocket,
) -> Result<(), Socks5Error>
where
    D: AsyncRead + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let session = UdpSession::new();
    let (mut tunnel_tx, mut tunnel_rx) = Framed::new(upstream, UdpAssociateCodec::new()).split();
    let (app_addr_tx, app_addr_rx) = watch::channel::<Option<SocketAddr>>(None);

    let local_to_tunnel = async {
        let mut buf = vec![0u8; MAX_UDP_PACKET];
        loop {
            let received = tokio::select! {
                _ = session.closed() => return,
                received = socket.recv_from(&mut buf) => received,
            };
            let (n, from) = match received {
                Ok(received) => received,
                Err(e) => {
                    session.fail(e.into());
                    return;
                }
            };
            app_addr_tx.send_replace(Some(from));

            let sent = tokio::select! {
                _ = session.closed() => return,
                sent = tunnel_tx.send(Bytes::copy_from_slice(&buf[..n])) => sent,
            };
            if let Err(e) = sent {
                session.fail(e.into());
                return;
            }
            trace!("Chained UDP: {} bytes from {} into tunnel", n, from);
        }
    };

    let tunnel_to_local = async {
        loop {
            let frame = tokio::select! {
                _ = session.closed() => return,
                frame = tunnel_rx.next() => frame,
            };
            let frame = match frame {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    session.fail(e.into());
                    return;
                }
                None => {
                    debug!("Upstream UDP tunnel closed");
                    session.close();
                    return;
                }
            };

            let app_addr = *app_addr_rx.borrow();
            let Some(app_addr) = app_addr else {
                debug!("Dropping {} byte datagram: no local peer yet", frame.len());
                continue;
            };
            if let Err(e) = socket.send_to(&frame, app_addr).await {
                debug!("Chained UDP send to {} failed: {}", app_addr, e);
            }
        }
    };

    let control = async {
        tokio::select! {
            _ = session.closed() => {}
            _ = monitor_control_stream(downstream) => session.close(),
        }
    };

    tokio::join!(local_to_tunnel, tunnel_to_local, control);

    session.into_result()
}

/// Wait until the downstream control connection closes
async fn monitor_control_stream<S>(mut stream: S)
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1];

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                debug!("Control stream closed, terminating UDP association");
                break;
            }
            Ok(_) => {
                warn!("Unexpected data on UDP control stream");
            }
            Err(e) => {
                debug!("Control stream error: {}", e);
                break;
            }
        }
    }
}

/// Client-side forwarder towards an upstream SOCKS5 server
#[derive(Debug, Clone)]
pub struct ChainForwarder {
    upstream_addr: String,
    metrics: Arc<dyn Socks5Metrics>,
}

impl ChainForwarder {
    /// Create a forwarder for `upstream_addr`
    pub fn new(upstream_addr: impl Into<String>) -> Self {
        ChainForwarder {
            upstream_addr: upstream_addr.into(),
            metrics: Arc::new(MetricsRecorder),
        }
    }

    /// Replace the metrics sink
    pub fn with_metrics(mut self, metrics: Arc<dyn Socks5Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Accept downstream connections until a shutdown signal is received
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<bool>,
    ) -> Result<()> {
        info!(
            "Chain forwarder listening on {}, upstream {}",
            listener.local_addr().context("Failed to get listener address")?,
            self.upstream_addr
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    let forwarder = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = forwarder.serve(stream).await {
                            debug!("Chained connection from {} ended: {:#}", peer, e);
                        }
                    });
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping chain forwarder");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Forward one downstream connection through the upstream server
    pub async fn serve(&self, mut downstream: TcpStream) -> Result<()> {
        let mut upstream = TcpStream::connect(&self.upstream_addr)
            .await
            .with_context(|| format!("Failed to connect to upstream {}", self.upstream_addr))?;

        let negotiated = async {
            forward_auth(&mut downstream, &mut upstream).await?;
            forward_connection_request(&mut downstream, &mut upstream).await
        };
        let udp_socket = match negotiated.await {
            Ok(udp_socket) => udp_socket,
            Err(e) => {
                self.metrics.record(Counter::HandshakeErrors);
                return Err(anyhow::Error::new(e).context("Failed to forward SOCKS5 handshake"));
            }
        };

        match udp_socket {
            Some(socket) => {
                info!(
                    "Chained UDP ASSOCIATE on local port {}",
                    socket.local_addr().context("Failed to get UDP socket address")?.port()
                );
                if let Err(e) = relay_chained_udp(downstream, upstream, socket).await {
                    self.metrics.record(Counter::UdpAssociateErrors);
                    return Err(anyhow::Error::new(e).context("Chained UDP relay failed"));
                }
            }
            None => {
                relay_tcp(downstream, upstream)
                    .await
                    .context("Chained TCP relay failed")?;
            }
        }

        Ok(())
    }
}
