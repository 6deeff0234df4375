//! Shared state of one UDP associate session

use crate::error::Socks5Error;
use std::sync::OnceLock;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Close signal plus first-error slot shared by both pumps
#[derive(Debug, Default)]
pub struct UdpSession {
    closed: CancellationToken,
    first_error: OnceLock<Socks5Error>,
}

impl UdpSession {
    /// Create an open session
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the session. Safe to call any number of times from either pump.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether either pump has closed the session
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session is closed
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Record `err` if no error has been recorded yet, then close.
    ///
    /// Returns `true` if this call won the slot.
    pub fn fail(&self, err: Socks5Error) -> bool {
        let won = self.first_error.set(err).is_ok();
        self.close();
        won
    }

    /// Consume the session, yielding the first recorded error
    pub fn into_result(self) -> Result<(), Socks5Error> {
        match self.first_error.into_inner() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
