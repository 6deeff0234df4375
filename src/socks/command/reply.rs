//! SOCKS5 reply writer
//!
//! Constructs SOCKS5 reply messages.

use crate::error::{ReplyCode, Socks5Error};
use crate::socks::addr::encode_addr_spec;
use crate::socks::consts::*;
use crate::socks::types::AddrSpec;
use bytes::{BufMut, BytesMut};
use std::net::{IpAddr, Ipv4Addr};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Build and send a SOCKS5 reply
///
/// # SOCKS5 Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Without a bound address the reply carries `0.0.0.0:0`.
pub async fn send_reply<S>(
    stream: &mut S,
    code: ReplyCode,
    bind_addr: Option<&AddrSpec>,
) -> Result<(), Socks5Error>
where
    S: AsyncWrite + Unpin,
{
    let reply = build_reply(code, bind_addr)?;

    stream.write_all(&reply).await?;
    stream.flush().await?;

    Ok(())
}

/// Serialize a reply without sending it.
///
/// Formatting errors surface before any byte is written, so a reply is
/// never truncated on the wire.
pub fn build_reply(code: ReplyCode, bind_addr: Option<&AddrSpec>) -> Result<BytesMut, Socks5Error> {
    let mut reply = BytesMut::with_capacity(22);
    reply.put_slice(&[SOCKS5_VERSION, code.into(), SOCKS5_RESERVED]);

    match bind_addr {
        Some(addr) => encode_addr_spec(addr, &mut reply)?,
        None => {
            let unspecified = AddrSpec::from_ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
            encode_addr_spec(&unspecified, &mut reply)?;
        }
    }

    Ok(reply)
}
