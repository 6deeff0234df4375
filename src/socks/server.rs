//! SOCKS5 server
//!
//! Accepts client connections, runs the handshake and dispatches each
//! request to the CONNECT or UDP ASSOCIATE handler.

use super::auth::authenticate;
use super::command::{parse_request, send_reply};
use super::resolver::{RequestScope, Resolver, SystemResolver};
use super::tcp_relay::handle_connect;
use super::types::{AddrSpec, Command, Request};
use super::udp::handle_associate;
use crate::config::SocksConfig;
use crate::error::{ReplyCode, Socks5Error};
use crate::metrics::{Counter, MetricsRecorder, Socks5Metrics};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// SOCKS5 server
#[derive(Debug, Clone)]
pub struct Socks5Server {
    config: SocksConfig,
    resolver: Arc<dyn Resolver>,
    metrics: Arc<dyn Socks5Metrics>,
}

impl Socks5Server {
    /// Create a server using the system resolver and the global metrics
    /// recorder
    pub fn new(config: SocksConfig) -> Self {
        Socks5Server {
            config,
            resolver: Arc::new(SystemResolver),
            metrics: Arc::new(MetricsRecorder),
        }
    }

    /// Replace the resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the metrics sink
    pub fn with_metrics(mut self, metrics: Arc<dyn Socks5Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Accept connections until a shutdown signal is received
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<bool>,
    ) -> Result<()> {
        info!(
            "SOCKS5 server listening on {}",
            listener.local_addr().context("Failed to get listener address")?
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.serve_connection(stream, Some(peer)).await {
                            debug!("Connection from {} ended: {:#}", peer, e);
                        }
                    });
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping SOCKS5 server");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Serve one client connection: handshake, request, dispatch
    pub async fn serve_connection<S>(&self, mut stream: S, peer: Option<SocketAddr>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let auth_context = match authenticate(&mut stream, &self.config).await {
            Ok(ctx) => ctx,
            Err(e) => {
                self.metrics.record(Counter::HandshakeErrors);
                return Err(e.context("Authentication negotiation failed"));
            }
        };

        debug!("Authentication completed with method: {:?}", auth_context.method);

        let mut request = match parse_request(&mut stream).await {
            Ok(request) => request,
            Err(e) => {
                if let Socks5Error::UnrecognizedAddressType(_) = e {
                    if let Err(reply_err) =
                        send_reply(&mut stream, ReplyCode::AddressTypeNotSupported, None).await
                    {
                        debug!("Failed to send address type reply: {}", reply_err);
                    }
                }
                return Err(anyhow::Error::new(e).context("Failed to parse SOCKS5 request"));
            }
        };
        request.auth_context = Some(auth_context);
        request.remote_addr = peer.map(AddrSpec::from);

        info!("SOCKS5 {} request to {}", request.command, request.dest_addr);

        self.handle_request(request, stream)
            .await
            .context("Failed to handle SOCKS5 request")
    }

    /// Resolve, apply policy and dispatch a parsed request
    pub async fn handle_request<S>(&self, mut req: Request, mut conn: S) -> Result<(), Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut scope = RequestScope::with_timeout(Duration::from_secs(self.config.request_timeout));

        if let Some(fqdn) = req.dest_addr.fqdn.clone() {
            match self.resolver.resolve(scope.clone(), &fqdn).await {
                Ok((resolved_scope, ip)) => {
                    scope = resolved_scope;
                    req.dest_addr.ip = Some(ip);
                }
                Err(source) => {
                    self.metrics.record(Counter::DnsResolveErrors);
                    warn!("Failed to resolve {}: {}", fqdn, source);
                    send_reply(&mut conn, ReplyCode::HostUnreachable, None).await?;
                    return Err(Socks5Error::ResolutionFailure { host: fqdn, source });
                }
            }
        }

        if !self.config.allow_local_destination && req.dest_addr.is_localhost() {
            warn!("Rejected request to local destination {}", req.dest_addr);
            send_reply(&mut conn, ReplyCode::RuleFailure, None).await?;
            return Err(Socks5Error::PolicyDenied(format!(
                "access to {} is not allowed",
                req.dest_addr
            )));
        }

        match req.command {
            Command::Connect => {
                handle_connect(conn, &req.dest_addr, &scope, &*self.metrics).await
            }
            Command::Associate => {
                let resolve_timeout = Duration::from_secs(self.config.request_timeout);
                handle_associate(conn, &*self.resolver, resolve_timeout, &*self.metrics).await
            }
            Command::Bind => {
                warn!("BIND command not supported");
                self.metrics.record(Counter::UnsupportedCommandErrors);
                if let Err(e) = send_reply(&mut conn, ReplyCode::CommandNotSupported, None).await {
                    self.metrics.record(Counter::HandshakeErrors);
                    return Err(e);
                }
                Ok(())
            }
            Command::Unknown(cmd) => {
                error!("Unsupported SOCKS5 command: {:#04x}", cmd);
                self.metrics.record(Counter::UnsupportedCommandErrors);
                send_reply(&mut conn, ReplyCode::CommandNotSupported, None).await?;
                Err(Socks5Error::UnsupportedCommand(cmd))
            }
        }
    }
}
