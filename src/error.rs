//! Error types for Sockschain
//!
//! This module defines the SOCKS5 error taxonomy and the reply codes the
//! engine answers with.

use std::io;
use thiserror::Error;

/// SOCKS5 specific errors
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Version byte of a request did not match SOCKS5
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// ATYP byte outside of {1, 3, 4}
    #[error("Unrecognized address type: {0}")]
    UnrecognizedAddressType(u8),

    /// Domain name that cannot be carried in an address spec
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    /// Address spec with neither an IP nor a domain name
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The resolver failed to produce an address
    #[error("Failed to resolve destination {host:?}: {source}")]
    ResolutionFailure {
        /// Host name that was looked up
        host: String,
        /// Underlying resolver error
        #[source]
        source: io::Error,
    },

    /// Destination rejected by local policy
    #[error("Access denied by policy: {0}")]
    PolicyDenied(String),

    /// Dialing the destination failed
    #[error("Connect to {target} failed ({code:?}): {source}")]
    DialFailure {
        /// Dial string of the destination
        target: String,
        /// Reply code sent back to the client
        code: ReplyCode,
        /// Underlying dial error
        #[source]
        source: io::Error,
    },

    /// BIND or an unknown command byte
    #[error("Unsupported command: {0}")]
    UnsupportedCommand(u8),

    /// UDP datagram shorter than its declared header
    #[error("UDP datagram too short: {0} bytes")]
    DatagramTooShort(usize),

    /// UDP datagram with a broken header
    #[error("Malformed UDP datagram: {0}")]
    MalformedDatagram(&'static str),

    /// UDP datagram requesting fragmentation
    #[error("UDP fragmentation is not supported (FRAG={0})")]
    FragmentedDatagram(u8),

    /// The UDP associate session was closed by the other pump
    #[error("UDP associate session closed")]
    SessionClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    ServerFailure = 0x01,
    /// Connection not allowed by ruleset
    RuleFailure = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl ReplyCode {
    /// Classify a failed dial into one of the three dial reply codes.
    pub fn from_dial_error(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ReplyCode::ConnectionRefused,
            io::ErrorKind::NetworkUnreachable => ReplyCode::NetworkUnreachable,
            _ => ReplyCode::HostUnreachable,
        }
    }
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        code as u8
    }
}
