//! SOCKS5 command module
//!
//! Handles parsing SOCKS5 requests and writing replies.

mod parser;
mod reply;

pub use parser::parse_request;
pub use reply::{build_reply, send_reply};
