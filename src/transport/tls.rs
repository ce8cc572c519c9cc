use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::error::{Result, RpcError};

/// Server TLS material as PEM text. Supplying this on the server config
/// switches the transport from plain TCP to TLS; client certificates are
/// not verified.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl TlsConfig {
    pub fn new(cert_pem: Vec<u8>, key_pem: Vec<u8>) -> Self {
        Self { cert_pem, key_pem }
    }

    /// Loads cert and key PEM from two file paths.
    pub fn from_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            cert_pem: std::fs::read(cert_path)?,
            key_pem: std::fs::read(key_path)?,
        })
    }

    pub(crate) fn acceptor(&self) -> Result<TlsAcceptor> {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let certs = certs_from_pem(&self.cert_pem)?;
        let key = private_key_from_pem(&self.key_pem)?;
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| RpcError::Tls {
                reason: format!("invalid certificate or key: {e}"),
            })?;
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

fn certs_from_pem(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut cursor = std::io::Cursor::new(pem);
    let mut certs = Vec::new();
    while let Ok(Some(item)) = rustls_pemfile::read_one(&mut cursor) {
        if let rustls_pemfile::Item::X509Certificate(cert) = item {
            certs.push(cert);
        }
    }
    if certs.is_empty() {
        return Err(RpcError::Tls {
            reason: "no certificates found in PEM".to_string(),
        });
    }
    Ok(certs)
}

fn private_key_from_pem(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut cursor = std::io::Cursor::new(pem);
    while let Ok(Some(item)) = rustls_pemfile::read_one(&mut cursor) {
        match item {
            rustls_pemfile::Item::Pkcs8Key(key) => return Ok(PrivateKeyDer::Pkcs8(key)),
            rustls_pemfile::Item::Pkcs1Key(key) => return Ok(PrivateKeyDer::Pkcs1(key)),
            rustls_pemfile::Item::Sec1Key(key) => return Ok(PrivateKeyDer::Sec1(key)),
            _ => continue,
        }
    }
    Err(RpcError::Tls {
        reason: "no private key found in PEM".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed() -> (Vec<u8>, Vec<u8>) {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        (
            certified.cert.pem().into_bytes(),
            certified.key_pair.serialize_pem().into_bytes(),
        )
    }

    #[test]
    fn acceptor_from_generated_pem() {
        let (cert_pem, key_pem) = self_signed();
        let config = TlsConfig::new(cert_pem, key_pem);
        assert!(config.acceptor().is_ok());
    }

    #[test]
    fn garbage_pem_is_rejected() {
        let config = TlsConfig::new(b"not pem".to_vec(), b"not pem".to_vec());
        assert!(matches!(config.acceptor(), Err(RpcError::Tls { .. })));
    }

    #[test]
    fn missing_key_is_rejected() {
        let (cert_pem, _) = self_signed();
        let config = TlsConfig::new(cert_pem.clone(), cert_pem);
        assert!(matches!(config.acceptor(), Err(RpcError::Tls { .. })));
    }
}
