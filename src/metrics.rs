//! Counters emitted by the SOCKS5 engine.
//!
//! The engine never touches global state: every handler is given a
//! [`Socks5Metrics`] sink. [`CounterSet`] keeps private atomic counters
//! (handy for tests), [`MetricsRecorder`] forwards to the `metrics` crate
//! so the Prometheus exporter can serve them.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// Events counted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Destination name could not be resolved
    DnsResolveErrors,
    /// BIND or unknown command received
    UnsupportedCommandErrors,
    /// Dial refused by the destination
    ConnectionRefusedErrors,
    /// Dial failed with network unreachable
    NetworkUnreachableErrors,
    /// Dial failed for any other reason
    HostUnreachableErrors,
    /// Handshake or reply could not be completed
    HandshakeErrors,
    /// UDP associate session or datagram failure
    UdpAssociateErrors,
    /// Datagrams received from the network
    UdpAssociateInPkts,
    /// Bytes received from the network
    UdpAssociateInBytes,
    /// Datagrams sent to the network
    UdpAssociateOutPkts,
    /// Bytes sent to the network
    UdpAssociateOutBytes,
}

/// Number of distinct counters
const COUNTER_COUNT: usize = 11;

impl Counter {
    /// All counters, in declaration order
    pub const ALL: [Counter; COUNTER_COUNT] = [
        Counter::DnsResolveErrors,
        Counter::UnsupportedCommandErrors,
        Counter::ConnectionRefusedErrors,
        Counter::NetworkUnreachableErrors,
        Counter::HostUnreachableErrors,
        Counter::HandshakeErrors,
        Counter::UdpAssociateErrors,
        Counter::UdpAssociateInPkts,
        Counter::UdpAssociateInBytes,
        Counter::UdpAssociateOutPkts,
        Counter::UdpAssociateOutBytes,
    ];

    /// Stable exported metric name
    pub fn name(self) -> &'static str {
        match self {
            Counter::DnsResolveErrors => "socks5_dns_resolve_errors_total",
            Counter::UnsupportedCommandErrors => "socks5_unsupported_command_errors_total",
            Counter::ConnectionRefusedErrors => "socks5_connection_refused_errors_total",
            Counter::NetworkUnreachableErrors => "socks5_network_unreachable_errors_total",
            Counter::HostUnreachableErrors => "socks5_host_unreachable_errors_total",
            Counter::HandshakeErrors => "socks5_handshake_errors_total",
            Counter::UdpAssociateErrors => "socks5_udp_associate_errors_total",
            Counter::UdpAssociateInPkts => "socks5_udp_associate_in_packets_total",
            Counter::UdpAssociateInBytes => "socks5_udp_associate_in_bytes_total",
            Counter::UdpAssociateOutPkts => "socks5_udp_associate_out_packets_total",
            Counter::UdpAssociateOutBytes => "socks5_udp_associate_out_bytes_total",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Increment-only counter sink
pub trait Socks5Metrics: Send + Sync + Debug {
    /// Add `value` to `counter`
    fn incr(&self, counter: Counter, value: u64);

    /// Add one to `counter`
    fn record(&self, counter: Counter) {
        self.incr(counter, 1);
    }
}

/// Private in-memory counters
#[derive(Debug, Default)]
pub struct CounterSet {
    values: [AtomicU64; COUNTER_COUNT],
}

impl CounterSet {
    /// Create a zeroed counter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `counter`
    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter.index()].load(Ordering::Relaxed)
    }
}

impl Socks5Metrics for CounterSet {
    fn incr(&self, counter: Counter, value: u64) {
        self.values[counter.index()].fetch_add(value, Ordering::Relaxed);
    }
}

/// Sink backed by the global `metrics` recorder
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsRecorder;

impl Socks5Metrics for MetricsRecorder {
    #[inline]
    fn incr(&self, counter: Counter, value: u64) {
        ::metrics::counter!(counter.name()).increment(value);
    }
}

/// Install the Prometheus exporter on `listen`.
#[cfg(feature = "prometheus")]
pub fn init_prometheus(listen: &str) -> anyhow::Result<()> {
    use anyhow::Context;

    let addr: std::net::SocketAddr = listen
        .parse()
        .with_context(|| format!("Invalid metrics listen address: {}", listen))?;

    ::metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install prometheus exporter")?;

    Ok(())
}
