//! SOCKS5 authentication module
//!
//! Handles method selection and username/password authentication.

mod password;

pub use password::verify_password;

use super::consts::*;
use crate::config::AuthConfig;
use crate::error::GatewayError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

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

    /// Parse from SOCKS5 method byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_AUTH_METHOD_NONE => Some(AuthMethod::None),
            SOCKS5_AUTH_METHOD_PASSWORD => Some(AuthMethod::Password),
            _ => None,
        }
    }
}

/// Read the client's offered methods and answer with the selected one
///
/// The version byte has already been consumed. When no offered method is
/// acceptable, `0xFF` is sent and an [`GatewayError::Auth`] is returned so the
/// caller closes the connection.
pub async fn negotiate_method<S>(
    stream: &mut S,
    auth: &AuthConfig,
) -> Result<AuthMethod, GatewayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let num_methods = stream.read_u8().await?;
    if num_methods == 0 {
        return Err(GatewayError::Protocol(
            "No authentication methods provided".to_string(),
        ));
    }

    let mut methods = vec![0u8; num_methods as usize];
    stream.read_exact(&mut methods).await?;

    let selected = select_auth_method(&methods, auth);
    let reply = selected
        .map(AuthMethod::to_byte)
        .unwrap_or(SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE);
    stream.write_all(&[SOCKS5_VERSION, reply]).await?;
    stream.flush().await?;

    match selected {
        Some(method) => {
            debug!("Selected authentication method {:?}", method);
            Ok(method)
        }
        None => Err(GatewayError::Auth(format!(
            "No acceptable authentication method in {:?}",
            methods
        ))),
    }
}

/// Select the authentication method based on configuration and offered methods
///
/// Configured credentials make password authentication mandatory; otherwise
/// only `NO_AUTH` is ever selected.
fn select_auth_method(methods: &[u8], auth: &AuthConfig) -> Option<AuthMethod> {
    let wanted = if auth.has_credentials() {
        AuthMethod::Password
    } else {
        AuthMethod::None
    };

    methods.contains(&wanted.to_byte()).then_some(wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_method_bytes() {
        assert_eq!(AuthMethod::None.to_byte(), SOCKS5_AUTH_METHOD_NONE);
        assert_eq!(AuthMethod::Password.to_byte(), SOCKS5_AUTH_METHOD_PASSWORD);
        assert_eq!(AuthMethod::from_byte(2), Some(AuthMethod::Password));
        assert_eq!(AuthMethod::from_byte(1), None);
    }

    #[test]
    fn test_select_without_credentials() {
        let auth = AuthConfig::default();
        assert_eq!(
            select_auth_method(&[SOCKS5_AUTH_METHOD_PASSWORD, SOCKS5_AUTH_METHOD_NONE], &auth),
            Some(AuthMethod::None)
        );
        assert_eq!(select_auth_method(&[SOCKS5_AUTH_METHOD_PASSWORD], &auth), None);
    }

    #[test]
    fn test_select_with_credentials() {
        let auth = AuthConfig::new("user", "pass");
        assert_eq!(
            select_auth_method(&[SOCKS5_AUTH_METHOD_NONE, SOCKS5_AUTH_METHOD_PASSWORD], &auth),
            Some(AuthMethod::Password)
        );
        // NO_AUTH is never offered back once credentials are configured
        assert_eq!(select_auth_method(&[SOCKS5_AUTH_METHOD_NONE], &auth), None);
    }

    #[tokio::test]
    async fn test_negotiate_sends_not_acceptable() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[1, SOCKS5_AUTH_METHOD_NONE]).await.unwrap();

        let result = negotiate_method(&mut server, &AuthConfig::new("u", "p")).await;
        assert!(matches!(result, Err(GatewayError::Auth(_))));

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE]);
    }

    #[tokio::test]
    async fn test_negotiate_no_auth() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&[2, SOCKS5_AUTH_METHOD_PASSWORD, SOCKS5_AUTH_METHOD_NONE])
            .await
            .unwrap();

        let method = negotiate_method(&mut server, &AuthConfig::default())
            .await
            .unwrap();
        assert_eq!(method, AuthMethod::None);

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE]);
    }

    #[tokio::test]
    async fn test_negotiate_rejects_empty_method_list() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0]).await.unwrap();

        let result = negotiate_method(&mut server, &AuthConfig::default()).await;
        assert!(matches!(result, Err(GatewayError::Protocol(_))));
    }
}
