//! # Sockschain - SOCKS5 Protocol Engine
//!
//! Sockschain turns raw bytes on a client connection into destination-routed
//! TCP streams and UDP datagram flows, and can re-emit the same SOCKS5
//! conversation towards an upstream proxy to chain two hops.
//!
//! ## Features
//!
//! - **CONNECT**: TCP relay with typed dial-failure replies
//! - **UDP ASSOCIATE**: Datagram relay over a framed control connection
//! - **BIND**: Always refused with "command not supported"
//! - **Chain Forwarder**: Transparent handshake replay with bind-port rewriting
//! - **Metrics**: Injected counter sink, optionally exported to Prometheus
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sockschain::config::SocksConfig;
//! use sockschain::socks::Socks5Server;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:1080").await?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     Arc::new(Socks5Server::new(SocksConfig::default()))
//!         .run(listener, shutdown_rx)
//!         .await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! App -> ChainForwarder -> Socks5Server -> Target
//!          (client side)    (server side)
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod socks;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{ReplyCode, Socks5Error};
pub use self::metrics::{Counter, CounterSet, MetricsRecorder, Socks5Metrics};
pub use socks::{ChainForwarder, Socks5Server};

/// Version of the Sockschain library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
