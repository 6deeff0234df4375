//! Username/password authentication handler
//!
//! Implements RFC 1929 username/password authentication for SOCKS5.

use crate::config::SocksConfig;
use crate::socks::consts::SOCKS5_AUTH_VERSION;
use anyhow::{anyhow, bail, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Authentication result codes
const AUTH_SUCCESS: u8 = 0x00;
const AUTH_FAILURE: u8 = 0x01;

/// Run the username/password sub-negotiation and return the user name.
///
/// Client sends:
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
///
/// Server responds with `VER STATUS`.
pub async fn authenticate_password<S>(stream: &mut S, config: &SocksConfig) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let expected_username = config
        .username
        .as_deref()
        .ok_or_else(|| anyhow!("Username not configured"))?;
    let expected_password = config
        .password
        .as_deref()
        .ok_or_else(|| anyhow!("Password not configured"))?;

    let version = stream.read_u8().await?;
    if version != SOCKS5_AUTH_VERSION {
        send_auth_result(stream, AUTH_FAILURE).await?;
        bail!("Invalid auth version: {}", version);
    }

    let username = read_field(stream).await?;
    let password = read_field(stream).await?;

    let (Some(username), Some(password)) = (username, password) else {
        send_auth_result(stream, AUTH_FAILURE).await?;
        bail!("Empty username or password");
    };

    if username == expected_username.as_bytes() && password == expected_password.as_bytes() {
        send_auth_result(stream, AUTH_SUCCESS).await?;
        let username = String::from_utf8_lossy(&username).into_owned();
        tracing::debug!("Authentication successful for user: {}", username);
        Ok(username)
    } else {
        send_auth_result(stream, AUTH_FAILURE).await?;
        bail!(
            "Authentication failed for user: {}",
            String::from_utf8_lossy(&username)
        );
    }
}

/// Read a length-prefixed field; `None` when the length is zero.
async fn read_field<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Option<Vec<u8>>> {
    let len = stream.read_u8().await? as usize;
    if len == 0 {
        return Ok(None);
    }
    let mut field = vec![0u8; len];
    stream.read_exact(&mut field).await?;
    Ok(Some(field))
}

/// Send authentication result to client
async fn send_auth_result<S: AsyncWrite + Unpin>(stream: &mut S, status: u8) -> Result<()> {
    stream.write_all(&[SOCKS5_AUTH_VERSION, status]).await?;
    stream.flush().await?;
    Ok(())
}
