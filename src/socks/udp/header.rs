//! SOCKS5 UDP request header
//!
//! ```text
//! +----+------+------+----------+----------+----------+
//! |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
//! +----+------+------+----------+----------+----------+
//! | 2  |  1   |  1   | Variable |    2     | Variable |
//! +----+------+------+----------+----------+----------+
//! ```

use crate::error::Socks5Error;
use crate::socks::addr::{decode_domain, encode_addr_spec};
use crate::socks::consts::*;
use crate::socks::types::AddrSpec;
use bytes::{BufMut, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A datagram with its header stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram<'a> {
    /// Where the payload should be sent
    pub dest: AddrSpec,
    /// Payload, borrowed from the original buffer
    pub payload: &'a [u8],
}

/// Validate and strip the UDP request header.
///
/// Checks run in wire order: total length, reserved bytes, fragment,
/// address type, then the length required by that address type. A
/// datagram without payload is rejected.
pub fn parse_udp_datagram(buf: &[u8]) -> Result<UdpDatagram<'_>, Socks5Error> {
    let n = buf.len();
    if n <= 6 {
        return Err(Socks5Error::DatagramTooShort(n));
    }
    if buf[0] != 0x00 || buf[1] != 0x00 {
        return Err(Socks5Error::MalformedDatagram("non-zero reserved bytes"));
    }
    if buf[2] != 0x00 {
        return Err(Socks5Error::FragmentedDatagram(buf[2]));
    }

    let addr_type = buf[3];
    let required = match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => 10,
        SOCKS5_ADDR_TYPE_DOMAIN => buf[4] as usize + 6,
        SOCKS5_ADDR_TYPE_IPV6 => 22,
        other => return Err(Socks5Error::UnrecognizedAddressType(other)),
    };
    if n <= required {
        return Err(Socks5Error::DatagramTooShort(n));
    }

    let (mut dest, port_at) = match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut ip = [0u8; 4];
            ip.copy_from_slice(&buf[4..8]);
            (AddrSpec::from_ip(IpAddr::V4(Ipv4Addr::from(ip)), 0), 8)
        }
        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut ip = [0u8; 16];
            ip.copy_from_slice(&buf[4..20]);
            (AddrSpec::from_ip(IpAddr::V6(Ipv6Addr::from(ip)), 0), 20)
        }
        _ => {
            let len = buf[4] as usize;
            let fqdn = decode_domain(buf[5..5 + len].to_vec())?;
            (AddrSpec::from_fqdn(fqdn, 0), 5 + len)
        }
    };
    dest.port = u16::from_be_bytes([buf[port_at], buf[port_at + 1]]);

    Ok(UdpDatagram {
        dest,
        payload: &buf[port_at + 2..],
    })
}

/// Prefix `payload` with a UDP request header for `dest`.
pub fn encode_udp_datagram(dest: &AddrSpec, payload: &[u8]) -> Result<BytesMut, Socks5Error> {
    let mut buf = BytesMut::with_capacity(4 + 18 + payload.len());
    buf.put_u16(0);
    buf.put_u8(0);
    encode_addr_spec(dest, &mut buf)?;
    buf.put_slice(payload);
    Ok(buf)
}
