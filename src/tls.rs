//! Per-handshake certificate resolution.
//!
//! The TLS provider is invoked once per handshake and never cached, so
//! certificate rotation (e.g. by cert-manager renewing a mounted secret)
//! takes effect on the next incoming connection without restarting the
//! listener. A provider failure aborts only the handshake that triggered it.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use tracing::error;

use crate::error::{Error, Result};

/// A PEM-encoded certificate chain and private key
#[derive(Debug)]
pub struct PemPair {
    /// PEM-encoded certificate chain
    pub cert: Vec<u8>,
    /// PEM-encoded private key
    pub key: Vec<u8>,
}

/// On-demand supplier of the server certificate.
///
/// Must be safe to invoke concurrently, since multiple handshakes can be
/// in flight at once.
pub trait TlsProvider: Send + Sync {
    /// Fetch the current certificate/key pair.
    fn fetch(&self) -> Result<PemPair>;
}

impl<F> TlsProvider for F
where
    F: Fn() -> Result<PemPair> + Send + Sync,
{
    fn fetch(&self) -> Result<PemPair> {
        self()
    }
}

/// TLS provider reading the certificate and key from files on every call.
///
/// Suited to certificates mounted from a Kubernetes secret, where the
/// mounted files are replaced in place on renewal.
pub struct FileTlsProvider {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl FileTlsProvider {
    /// Create a provider reading from the given PEM file paths.
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }
}

impl TlsProvider for FileTlsProvider {
    fn fetch(&self) -> Result<PemPair> {
        Ok(PemPair {
            cert: std::fs::read(&self.cert_path)?,
            key: std::fs::read(&self.key_path)?,
        })
    }
}

/// rustls certificate resolver backed by a [`TlsProvider`].
///
/// Resolution failures are logged and abort the handshake; they never
/// affect the server process or other in-flight connections.
pub(crate) struct DynamicCertResolver {
    provider: Arc<dyn TlsProvider>,
}

impl fmt::Debug for DynamicCertResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicCertResolver").finish_non_exhaustive()
    }
}

impl DynamicCertResolver {
    /// Fetch and parse the current certificate, once per handshake.
    fn load(&self) -> Result<CertifiedKey> {
        let pair = self.provider.fetch()?;
        certified_key(&pair)
    }
}

impl ResolvesServerCert for DynamicCertResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        match self.load() {
            Ok(key) => Some(Arc::new(key)),
            Err(e) => {
                error!(error = %e, "failed to resolve server certificate, aborting handshake");
                None
            }
        }
    }
}

/// Parse a PEM pair into a rustls certified key.
fn certified_key(pair: &PemPair) -> Result<CertifiedKey> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut pair.cert.as_slice())
        .collect::<std::io::Result<Vec<_>>>()?;
    if certs.is_empty() {
        return Err(Error::TlsConfig("no certificates found in PEM".to_string()));
    }
    let key = rustls_pemfile::private_key(&mut pair.key.as_slice())?
        .ok_or_else(|| Error::TlsConfig("no private key found in PEM".to_string()))?;
    let key = rustls::crypto::aws_lc_rs::sign::any_supported_type(&key)
        .map_err(|e| Error::TlsConfig(e.to_string()))?;
    Ok(CertifiedKey::new(certs, key))
}

/// Build the listener TLS configuration.
///
/// TLS 1.2 is the minimum negotiated version; the certificate is supplied
/// per handshake by the resolver.
pub(crate) fn server_config(provider: Arc<dyn TlsProvider>) -> rustls::ServerConfig {
    let mut config = rustls::ServerConfig::builder_with_protocol_versions(&[
        &rustls::version::TLS13,
        &rustls::version::TLS12,
    ])
    .with_no_client_auth()
    .with_cert_resolver(Arc::new(DynamicCertResolver { provider }));
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    config
}
