//! SOCKS5 type definitions
//!
//! Defines the core types used in SOCKS5 protocol handling.

use super::auth::AuthContext;
use super::consts::*;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND - wait for incoming connection (refused)
    Bind,
    /// UDP ASSOCIATE - establish UDP relay
    Associate,
    /// Any other command byte, rejected at dispatch
    Unknown(u8),
}

impl From<u8> for Command {
    fn from(byte: u8) -> Self {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Command::Connect,
            SOCKS5_CMD_TCP_BIND => Command::Bind,
            SOCKS5_CMD_UDP_ASSOCIATE => Command::Associate,
            other => Command::Unknown(other),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "CONNECT"),
            Command::Bind => write!(f, "BIND"),
            Command::Associate => write!(f, "UDP ASSOCIATE"),
            Command::Unknown(byte) => write!(f, "UNKNOWN({})", byte),
        }
    }
}

/// A destination or bound address.
///
/// Before resolution at most one of `fqdn` and `ip` is set. Resolution
/// fills in `ip` and keeps `fqdn` for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddrSpec {
    /// Domain name, if the peer sent one
    pub fqdn: Option<String>,
    /// Raw network address
    pub ip: Option<IpAddr>,
    /// Port number
    pub port: u16,
}

impl AddrSpec {
    /// Create an address spec from an IP address and port
    pub fn from_ip(ip: IpAddr, port: u16) -> Self {
        AddrSpec {
            fqdn: None,
            ip: Some(ip),
            port,
        }
    }

    /// Create an address spec from a domain name and port
    pub fn from_fqdn(fqdn: impl Into<String>, port: u16) -> Self {
        AddrSpec {
            fqdn: Some(fqdn.into()),
            ip: None,
            port,
        }
    }

    /// Dial string; prefers the IP and falls back to the domain name.
    pub fn address(&self) -> String {
        match (&self.ip, &self.fqdn) {
            (Some(ip), _) => SocketAddr::new(*ip, self.port).to_string(),
            (None, Some(fqdn)) => format!("{}:{}", fqdn, self.port),
            (None, None) => format!(":{}", self.port),
        }
    }

    /// Socket address, available once an IP is known
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ip.map(|ip| SocketAddr::new(ip, self.port))
    }

    /// Whether this address points at the local host
    pub fn is_localhost(&self) -> bool {
        self.fqdn.as_deref() == Some("localhost")
            || self.ip.map(|ip| ip.is_loopback()).unwrap_or(false)
    }
}

impl fmt::Display for AddrSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.fqdn, &self.ip) {
            (Some(fqdn), Some(ip)) => write!(f, "{} ({}):{}", fqdn, ip, self.port),
            (Some(fqdn), None) => write!(f, "{}:{}", fqdn, self.port),
            (None, _) => write!(f, "{}", self.address()),
        }
    }
}

impl From<SocketAddr> for AddrSpec {
    fn from(addr: SocketAddr) -> Self {
        AddrSpec::from_ip(addr.ip(), addr.port())
    }
}

/// A request received by a server after the handshake.
#[derive(Debug, Clone)]
pub struct Request {
    /// Protocol version
    pub version: u8,
    /// Requested command
    pub command: Command,
    /// Authentication context provided during negotiation
    pub auth_context: Option<AuthContext>,
    /// Address of the peer that sent the request
    pub remote_addr: Option<AddrSpec>,
    /// Desired destination
    pub dest_addr: AddrSpec,
}
