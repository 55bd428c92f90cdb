//! TLS transport implementation
//!
//! Client connectors for `wss://` tunnels and the server acceptor for the
//! remote role, both on rustls (pure Rust, easy static linking).

use crate::config::{TlsConfig, TunnelConfig};
use crate::error::GatewayError;
use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio_rustls::rustls::{
    ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore, ServerConfig,
    SignatureScheme,
};
use tokio_rustls::{client, TlsAcceptor, TlsConnector};

/// Build the connector for a `wss://` tunnel
///
/// Trusts the platform roots plus `trusted_root`; `skip_cert_verify`
/// disables verification entirely.
pub fn client_connector(config: &TunnelConfig) -> Result<TlsConnector> {
    let tls_config = if config.skip_cert_verify {
        tracing::warn!("Certificate verification disabled for {}", config.uri);
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth()
    } else {
        let mut root_store = RootCertStore::empty();

        let native_certs = rustls_native_certs::load_native_certs();
        for cert in native_certs.certs {
            root_store.add(cert).ok();
        }

        if let Some(ref root_path) = config.trusted_root {
            for cert in load_certs(root_path)? {
                root_store
                    .add(cert)
                    .with_context(|| "Failed to add certificate to store")?;
            }
        }

        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(tls_config)))
}

/// Build the acceptor for the remote role's listener
pub fn server_acceptor(config: &TlsConfig) -> Result<TlsAcceptor> {
    let certs = load_certs(&config.cert)?;
    if certs.is_empty() {
        return Err(anyhow!("No certificates found in {}", config.cert));
    }
    let key = load_private_key(&config.key)?;

    let server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .with_context(|| {
            format!(
                "Invalid certificate/key pair: {} / {}",
                config.cert, config.key
            )
        })?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

/// Run the client handshake over an established TCP connection
pub async fn connect_tls(
    connector: &TlsConnector,
    host: &str,
    stream: TcpStream,
) -> Result<client::TlsStream<TcpStream>, GatewayError> {
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| GatewayError::Config(format!("Invalid TLS server name {}: {}", host, e)))?;

    let tls_stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| {
            GatewayError::Transport(format!("TLS handshake failed with {}: {}", host, e))
        })?;

    tracing::debug!("TLS connection established to {}", host);
    Ok(tls_stream)
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open certificate file: {}", path))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse certificates from: {}", path))
}

fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).with_context(|| format!("Failed to open key file: {}", path))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .with_context(|| format!("Failed to parse private key from: {}", path))?
        .ok_or_else(|| anyhow!("No private key found in {}", path))
}

/// Certificate verifier that accepts all certificates (dangerous!)
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
