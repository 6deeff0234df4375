//! TCP relay for SOCKS5 CONNECT command
//!
//! Handles TCP CONNECT requests by establishing a connection to the target
//! and relaying data bidirectionally.

use crate::error::{ReplyCode, Socks5Error};
use crate::metrics::{Counter, Socks5Metrics};
use crate::socks::command::send_reply;
use crate::socks::resolver::RequestScope;
use crate::socks::types::AddrSpec;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Handle TCP CONNECT command
///
/// This function:
/// 1. Dials the (already resolved) destination inside `scope`
/// 2. Answers the client with the dial outcome
/// 3. Relays data bidirectionally between client and target
///
/// A failed dial is answered with connection refused, network unreachable
/// or host unreachable depending on the error kind.
pub async fn handle_connect<S>(
    mut conn: S,
    dest: &AddrSpec,
    scope: &RequestScope,
    metrics: &dyn Socks5Metrics,
) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let target = dest
        .socket_addr()
        .ok_or_else(|| Socks5Error::InvalidAddress(dest.to_string()))?;

    debug!("Connecting to target: {}", target);

    let target_stream = match scope.run(TcpStream::connect(target)).await {
        Ok(stream) => stream,
        Err(source) => {
            let code = ReplyCode::from_dial_error(&source);
            metrics.record(match code {
                ReplyCode::ConnectionRefused => Counter::ConnectionRefusedErrors,
                ReplyCode::NetworkUnreachable => Counter::NetworkUnreachableErrors,
                _ => Counter::HostUnreachableErrors,
            });
            warn!("Failed to connect to {}: {}", target, source);

            if let Err(e) = send_reply(&mut conn, code, None).await {
                metrics.record(Counter::HandshakeErrors);
                debug!("Failed to send dial failure reply: {}", e);
            }
            return Err(Socks5Error::DialFailure {
                target: dest.address(),
                code,
                source,
            });
        }
    };

    let bind_addr = AddrSpec::from(target_stream.local_addr()?);
    if let Err(e) = send_reply(&mut conn, ReplyCode::Succeeded, Some(&bind_addr)).await {
        metrics.record(Counter::HandshakeErrors);
        return Err(e);
    }

    info!("SOCKS5 tunnel established to {}", dest);

    relay_tcp(conn, target_stream).await
}

/// Relay data bidirectionally between two streams
///
/// Each direction half-closes its destination when its source hits EOF,
/// and the relay returns once both directions are done. The first error
/// is reported, client to target first.
pub async fn relay_tcp<A, B>(client: A, target: B) -> Result<(), Socks5Error>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut target_read, mut target_write) = tokio::io::split(target);

    let (upstream, downstream) = tokio::join!(
        pipe(&mut client_read, &mut target_write, "client->target"),
        pipe(&mut target_read, &mut client_write, "target->client"),
    );

    upstream?;
    downstream?;
    Ok(())
}

async fn pipe<R, W>(reader: &mut R, writer: &mut W, direction: &str) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = tokio::io::copy(reader, writer).await;
    let _ = writer.shutdown().await;

    match &result {
        Ok(bytes) => debug!("{} finished: {} bytes", direction, bytes),
        Err(e) => debug!("{} error: {}", direction, e),
    }
    result
}
