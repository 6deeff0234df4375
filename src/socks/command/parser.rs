//! SOCKS5 request parser
//!
//! Parses SOCKS5 connection requests from the client.

use crate::error::Socks5Error;
use crate::socks::addr::read_addr_spec;
use crate::socks::consts::*;
use crate::socks::types::{Command, Request};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Parse a SOCKS5 request from the stream
///
/// # SOCKS5 Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// The command byte is not validated here; unknown commands are
/// answered by the dispatcher.
pub async fn parse_request<S>(stream: &mut S) -> Result<Request, Socks5Error>
where
    S: AsyncRead + Unpin,
{
    // Read: VER CMD RSV
    let mut header = [0u8; 3];
    stream.read_exact(&mut header).await?;

    if header[0] != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(header[0]));
    }

    let dest_addr = read_addr_spec(stream).await?;

    Ok(Request {
        version: SOCKS5_VERSION,
        command: Command::from(header[1]),
        auth_context: None,
        remote_addr: None,
        dest_addr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::{IpAddr, Ipv4Addr};

    #[tokio::test]
    async fn test_parse_connect_ipv4() {
        let data = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_IPV4,
            93,
            184,
            216,
            34,
            0x00,
            0x50,
        ];
        let mut cursor = Cursor::new(data);
        let request = parse_request(&mut cursor).await.unwrap();

        assert_eq!(request.version, SOCKS5_VERSION);
        assert_eq!(request.command, Command::Connect);
        assert_eq!(
            request.dest_addr.ip,
            Some(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)))
        );
        assert_eq!(request.dest_addr.port, 80);
        assert!(request.auth_context.is_none());
    }

    #[tokio::test]
    async fn test_parse_associate_domain() {
        let mut data = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_UDP_ASSOCIATE,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            11,
        ];
        data.extend_from_slice(b"example.com");
        data.extend_from_slice(&443u16.to_be_bytes());

        let request = parse_request(&mut Cursor::new(data)).await.unwrap();
        assert_eq!(request.command, Command::Associate);
        assert_eq!(request.dest_addr.fqdn.as_deref(), Some("example.com"));
        assert_eq!(request.dest_addr.port, 443);
    }

    #[tokio::test]
    async fn test_parse_keeps_unknown_command() {
        let data = vec![SOCKS5_VERSION, 0x09, 0x00, 0x01, 1, 2, 3, 4, 0, 1];
        let request = parse_request(&mut Cursor::new(data)).await.unwrap();
        assert_eq!(request.command, Command::Unknown(9));
    }

    #[tokio::test]
    async fn test_parse_rejects_socks4() {
        let data = vec![0x04, 0x01, 0x00, 0x01, 1, 2, 3, 4, 0, 1];
        let err = parse_request(&mut Cursor::new(data)).await.unwrap_err();
        assert!(matches!(err, Socks5Error::UnsupportedVersion(4)));
    }

    #[tokio::test]
    async fn test_parse_rejects_unknown_address_type() {
        let data = vec![SOCKS5_VERSION, 0x01, 0x00, 0x02, 1, 2, 3, 4, 0, 1];
        let err = parse_request(&mut Cursor::new(data)).await.unwrap_err();
        assert!(matches!(err, Socks5Error::UnrecognizedAddressType(2)));
    }

    #[tokio::test]
    async fn test_parse_truncated_header() {
        let err = parse_request(&mut Cursor::new(vec![SOCKS5_VERSION]))
            .await
            .unwrap_err();
        assert!(matches!(err, Socks5Error::Io(_)));
    }
}
