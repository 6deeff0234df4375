//! SOCKS5 module for Sockschain
//!
//! This module implements the SOCKS5 protocol engine: the address codec,
//! request parsing and replies, the command dispatcher with its CONNECT
//! and UDP ASSOCIATE handlers, and the chain forwarder that replays a
//! client's conversation against an upstream SOCKS5 server.

pub mod addr;
pub mod auth;
pub mod chain;
pub mod command;
pub mod consts;
pub mod resolver;
pub mod server;
pub mod tcp_relay;
pub mod types;
pub mod udp;

pub use addr::{copy_addr_body, encode_addr_spec, read_addr_spec};
pub use auth::{authenticate, AuthContext, AuthMethod};
pub use chain::{forward_auth, forward_connection_request, relay_chained_udp, ChainForwarder};
pub use command::{build_reply, parse_request, send_reply};
pub use resolver::{RequestScope, Resolver, SystemResolver};
pub use server::Socks5Server;
pub use tcp_relay::{handle_connect, relay_tcp};
pub use types::{AddrSpec, Command, Request};
pub use udp::{handle_associate, run_udp_relay, UdpAssociateCodec};
