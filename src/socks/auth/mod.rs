//! SOCKS5 authentication module
//!
//! Handles method negotiation and username/password authentication, and
//! produces the [`AuthContext`] attached to every request.

mod password;

pub use password::authenticate_password;

use super::consts::*;
use crate::config::SocksConfig;
use anyhow::{bail, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Authentication method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication required
    None,
    /// Username/password authentication
    Password,
}

impl AuthMethod {
    /// Convert to SOCKS5 method byte
    pub fn to_byte(self) -> u8 {
        match self {
            AuthMethod::None => SOCKS5_AUTH_METHOD_NONE,
            AuthMethod::Password => SOCKS5_AUTH_METHOD_PASSWORD,
        }
    }
}

/// Outcome of the handshake, carried read-only on the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Negotiated method
    pub method: AuthMethod,
    /// Authenticated user, for password authentication
    pub username: Option<String>,
}

/// Perform method negotiation and authentication
///
/// 1. Read client's supported methods
/// 2. Select appropriate method based on configuration
/// 3. Perform authentication if required
pub async fn authenticate<S>(stream: &mut S, config: &SocksConfig) -> Result<AuthContext>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let num_methods = buf[1];

    if version != SOCKS5_VERSION {
        bail!("Unsupported SOCKS version: {}", version);
    }

    if num_methods == 0 {
        bail!("No authentication methods provided");
    }

    let mut methods = vec![0u8; num_methods as usize];
    stream.read_exact(&mut methods).await?;

    let selected_method = select_auth_method(&methods, config);

    stream
        .write_all(&[
            SOCKS5_VERSION,
            selected_method
                .map(|m| m.to_byte())
                .unwrap_or(SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE),
        ])
        .await?;
    stream.flush().await?;

    let method = match selected_method {
        Some(m) => m,
        None => bail!("No acceptable authentication method"),
    };

    let username = match method {
        AuthMethod::Password => Some(authenticate_password(stream, config).await?),
        AuthMethod::None => None,
    };

    Ok(AuthContext { method, username })
}

/// Select the best authentication method based on configuration and available methods
fn select_auth_method(methods: &[u8], config: &SocksConfig) -> Option<AuthMethod> {
    if config.auth_required {
        if methods.contains(&SOCKS5_AUTH_METHOD_PASSWORD) {
            return Some(AuthMethod::Password);
        }
    } else {
        if methods.contains(&SOCKS5_AUTH_METHOD_NONE) {
            return Some(AuthMethod::None);
        }
        if methods.contains(&SOCKS5_AUTH_METHOD_PASSWORD) && config.has_credentials() {
            return Some(AuthMethod::Password);
        }
    }

    None
}
