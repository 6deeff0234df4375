//! Name resolution and per-request cancellation scope
//!
//! A [`RequestScope`] bounds everything a request does before relaying:
//! DNS lookup and the TCP dial. A resolver may hand back a different
//! scope, which then replaces the original for the rest of the request.

use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus optional deadline
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestScope {
    /// Unbounded scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().with_deadline(Instant::now() + timeout)
    }

    /// Same cancellation, tighter of the two deadlines
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        RequestScope {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this scope and every clone of it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the scope was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `fut` inside the scope.
    ///
    /// Cancellation yields `Interrupted`, an expired deadline `TimedOut`.
    pub async fn run<F, T>(&self, fut: F) -> io::Result<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = fut => result,
            _ = self.cancel.cancelled() => Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "request cancelled",
            )),
            _ = expired => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "request deadline exceeded",
            )),
        }
    }
}

/// DNS resolution capability
#[async_trait]
pub trait Resolver: Send + Sync + Debug {
    /// Resolve `host` to a single address.
    ///
    /// The returned scope supersedes `scope` for the remainder of the
    /// request.
    async fn resolve(&self, scope: RequestScope, host: &str) -> io::Result<(RequestScope, IpAddr)>;
}

/// Resolver backed by the system's `getaddrinfo`
#[derive(Debug, Clone, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, scope: RequestScope, host: &str) -> io::Result<(RequestScope, IpAddr)> {
        let ip = scope
            .run(async {
                tokio::net::lookup_host((host, 0))
                    .await?
                    .next()
                    .map(|addr| addr.ip())
                    .ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::NotFound,
                            format!("no addresses found for {}", host),
                        )
                    })
            })
            .await?;

        Ok((scope, ip))
    }
}
