//! Chain forwarder configuration types

use serde::{Deserialize, Serialize};

/// Chain forwarder section
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChainConfig {
    /// Local address downstream SOCKS5 clients connect to
    pub listen_addr: String,

    /// Upstream SOCKS5 server the conversation is replayed against
    pub upstream_addr: String,
}

impl ChainConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.upstream_addr.trim().is_empty() {
            return Err("chain.upstream_addr must not be empty".to_string());
        }
        Ok(())
    }
}
