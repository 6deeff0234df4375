//! Configuration module for Sockschain
//!
//! This module provides configuration types and parsing for the server,
//! the chain forwarder and the metrics exporter.

mod chain;
mod metrics;
mod server;

pub use chain::ChainConfig;
pub use self::metrics::MetricsConfig;
pub use server::{ServerConfig, SocksConfig};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// SOCKS5 server
    #[serde(default)]
    pub server: Option<ServerConfig>,

    /// Chain forwarder
    #[serde(default)]
    pub chain: Option<ChainConfig>,

    /// Prometheus exporter
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.is_none() && self.chain.is_none() {
            bail!("Configuration must contain a [server] or a [chain] section");
        }

        if let Some(server) = &self.server {
            parse_listen_addr(&server.listen_addr)?;
            server.socks.validate().map_err(anyhow::Error::msg)?;
        }

        if let Some(chain) = &self.chain {
            parse_listen_addr(&chain.listen_addr)?;
            chain.validate().map_err(anyhow::Error::msg)?;
        }

        if let Some(metrics) = &self.metrics {
            parse_listen_addr(&metrics.listen)?;
        }

        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse configuration")?;
    config.validate()?;
    Ok(config)
}

/// Parse a listen address from the configuration
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr> {
    addr.parse()
        .with_context(|| format!("Invalid listen address: {}", addr))
}
