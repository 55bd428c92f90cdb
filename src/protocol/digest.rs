//! Tunnel authentication digests
//!
//! Provides the per-connection nonce and the HMAC-SHA256 credential that
//! binds a connect request to one nonce and one destination.

use crate::error::GatewayError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Nonce width in bytes (256 bits)
pub const NONCE_LEN: usize = 32;

/// Random value generated once per tunnel connection by the remote side
#[derive(Clone, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_LEN]);

impl Nonce {
    /// Generate a fresh random nonce
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Nonce(bytes)
    }

    /// Decode a nonce from the base64 text carried by a `hello` message
    pub fn from_base64(encoded: &str) -> Result<Self, GatewayError> {
        let decoded = BASE64
            .decode(encoded)
            .map_err(|e| GatewayError::Protocol(format!("Invalid nonce encoding: {}", e)))?;
        let bytes: [u8; NONCE_LEN] = decoded.try_into().map_err(|v: Vec<u8>| {
            GatewayError::Protocol(format!("Invalid nonce length: {}", v.len()))
        })?;
        Ok(Nonce(bytes))
    }

    /// Base64 text form
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Raw nonce bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

impl From<[u8; NONCE_LEN]> for Nonce {
    fn from(bytes: [u8; NONCE_LEN]) -> Self {
        Nonce(bytes)
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", self.to_base64())
    }
}

/// Builds the HMAC credential for a tunnel connect request
///
/// ```text
/// token = base64(HMAC-SHA256(secret, nonce || address || port as u32 BE))
/// ```
#[derive(Clone)]
pub struct AuthCredentialBuilder {
    secret: Vec<u8>,
}

impl AuthCredentialBuilder {
    /// Create a builder keyed by the shared secret
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        AuthCredentialBuilder {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, nonce: &Nonce, address: &str, port: u16) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(nonce.as_bytes());
        mac.update(address.as_bytes());
        mac.update(&u32::from(port).to_be_bytes());
        mac
    }

    /// Compute the token for a destination
    pub fn token(&self, nonce: &Nonce, address: &str, port: u16) -> String {
        BASE64.encode(self.mac(nonce, address, port).finalize().into_bytes())
    }

    /// Check a supplied token against the expected one in constant time
    pub fn verify(&self, nonce: &Nonce, address: &str, port: u16, token: &str) -> bool {
        match BASE64.decode(token) {
            Ok(tag) => self.mac(nonce, address, port).verify_slice(&tag).is_ok(),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for AuthCredentialBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCredentialBuilder")
            .field("secret", &"<redacted>")
            .finish()
    }
}
