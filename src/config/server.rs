//! Server configuration types
//!
//! Defines the SOCKS5 server section and its protocol policy.

use serde::{Deserialize, Serialize};

/// Default listen address for the SOCKS5 server
fn default_server_listen_addr() -> String {
    "127.0.0.1:1080".to_string()
}

/// Default request timeout in seconds
fn default_request_timeout() -> u64 {
    10
}

/// SOCKS5 server section
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address the server accepts SOCKS5 clients on
    #[serde(default = "default_server_listen_addr")]
    pub listen_addr: String,

    /// SOCKS5 protocol policy
    #[serde(default)]
    pub socks: SocksConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_server_listen_addr(),
            socks: SocksConfig::default(),
        }
    }
}

/// SOCKS5 protocol policy
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SocksConfig {
    /// Enable/disable authentication
    #[serde(default)]
    pub auth_required: bool,

    /// Username for SOCKS5 auth
    #[serde(default)]
    pub username: Option<String>,

    /// Password for SOCKS5 auth
    #[serde(default)]
    pub password: Option<String>,

    /// Allow requests whose destination is loopback or "localhost"
    #[serde(default)]
    pub allow_local_destination: bool,

    /// Time budget in seconds for resolving and dialing a destination
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for SocksConfig {
    fn default() -> Self {
        Self {
            auth_required: false,
            username: None,
            password: None,
            allow_local_destination: false,
            request_timeout: default_request_timeout(),
        }
    }
}

impl SocksConfig {
    /// Check if authentication credentials are configured
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.auth_required && !self.has_credentials() {
            return Err("Authentication required but no credentials configured".to_string());
        }
        if self.request_timeout == 0 {
            return Err("request_timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}
