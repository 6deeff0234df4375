//! SOCKS5 address-spec codec
//!
//! Reads and writes the `ATYP ADDR PORT` triplet shared by requests,
//! replies and UDP datagram headers.

use super::consts::*;
use super::types::AddrSpec;
use crate::error::Socks5Error;
use bytes::{BufMut, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read an address spec from the stream
///
/// Expects an address type byte, followed by the address and port.
/// An unknown address type fails after consuming only the type byte.
pub async fn read_addr_spec<S>(stream: &mut S) -> Result<AddrSpec, Socks5Error>
where
    S: AsyncRead + Unpin,
{
    let addr_type = stream.read_u8().await?;

    let mut spec = match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            AddrSpec::from_ip(IpAddr::V4(Ipv4Addr::from(addr)), 0)
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            AddrSpec::from_ip(IpAddr::V6(Ipv6Addr::from(addr)), 0)
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            let len = stream.read_u8().await? as usize;
            let mut domain = vec![0u8; len];
            stream.read_exact(&mut domain).await?;
            AddrSpec::from_fqdn(decode_domain(domain)?, 0)
        }

        other => return Err(Socks5Error::UnrecognizedAddressType(other)),
    };

    spec.port = stream.read_u16().await?;

    Ok(spec)
}

/// Append the wire form of an address spec to `buf`.
///
/// A domain name takes precedence over an IP, mirroring the read side
/// where only one of them is ever present.
pub fn encode_addr_spec(addr: &AddrSpec, buf: &mut BytesMut) -> Result<(), Socks5Error> {
    match (&addr.fqdn, &addr.ip) {
        (Some(fqdn), _) => {
            if fqdn.is_empty() || fqdn.len() > MAX_DOMAIN_LEN {
                return Err(Socks5Error::InvalidDomain(fqdn.clone()));
            }
            buf.put_u8(SOCKS5_ADDR_TYPE_DOMAIN);
            buf.put_u8(fqdn.len() as u8);
            buf.put_slice(fqdn.as_bytes());
        }
        (None, Some(IpAddr::V4(ip))) => {
            buf.put_u8(SOCKS5_ADDR_TYPE_IPV4);
            buf.put_slice(&ip.octets());
        }
        (None, Some(IpAddr::V6(ip))) => {
            buf.put_u8(SOCKS5_ADDR_TYPE_IPV6);
            buf.put_slice(&ip.octets());
        }
        (None, None) => {
            return Err(Socks5Error::InvalidAddress(format!(
                "no IP or domain for port {}",
                addr.port
            )))
        }
    }
    buf.put_u16(addr.port);

    Ok(())
}

/// Copy the raw `ADDR PORT` bytes that follow `addr_type` into `out`.
///
/// Used when an address must be forwarded byte-for-byte rather than
/// interpreted; the FQDN length prefix is kept.
pub async fn copy_addr_body<S>(
    stream: &mut S,
    addr_type: u8,
    out: &mut Vec<u8>,
) -> Result<(), Socks5Error>
where
    S: AsyncRead + Unpin,
{
    let body_len = match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => 4 + 2,
        SOCKS5_ADDR_TYPE_IPV6 => 16 + 2,
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let len = stream.read_u8().await?;
            out.push(len);
            len as usize + 2
        }
        other => return Err(Socks5Error::UnrecognizedAddressType(other)),
    };

    let start = out.len();
    out.resize(start + body_len, 0);
    stream.read_exact(&mut out[start..]).await?;

    Ok(())
}

/// Decode a domain name read off the wire
pub(crate) fn decode_domain(raw: Vec<u8>) -> Result<String, Socks5Error> {
    if raw.is_empty() {
        return Err(Socks5Error::InvalidDomain(String::new()));
    }
    String::from_utf8(raw)
        .map_err(|e| Socks5Error::InvalidDomain(String::from_utf8_lossy(e.as_bytes()).into_owned()))
}
