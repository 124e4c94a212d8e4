//! TLS configuration and certificate loading.
//!
//! Certificates are issued externally (e.g. by an ACME client) and read from
//! PEM files. The files are checked with `rustls-pemfile` before they are
//! handed to `axum-server` so a bad path or an empty bundle fails at startup
//! with a precise message.

use std::io::BufReader;
use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;

use crate::config::TlsConfig;

/// Error type for TLS setup.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no certificates found in {0:?}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),

    #[error("invalid TLS material: {0}")]
    Invalid(std::io::Error),
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Count the certificates in a PEM bundle.
pub fn count_certificates(pem: &[u8]) -> Result<usize, std::io::Error> {
    let mut reader = BufReader::new(pem);
    let mut count = 0;
    for cert in rustls_pemfile::certs(&mut reader) {
        cert?;
        count += 1;
    }
    Ok(count)
}

/// Whether a PEM document contains a private key.
pub fn has_private_key(pem: &[u8]) -> Result<bool, std::io::Error> {
    let mut reader = BufReader::new(pem);
    Ok(rustls_pemfile::private_key(&mut reader)?.is_some())
}

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(config: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    let cert_path = Path::new(&config.cert_path);
    let key_path = Path::new(&config.key_path);

    let cert = read_pem(cert_path)?;
    let key = read_pem(key_path)?;

    if count_certificates(&cert).map_err(TlsError::Invalid)? == 0 {
        return Err(TlsError::NoCertificates(cert_path.to_path_buf()));
    }
    if !has_private_key(&key).map_err(TlsError::Invalid)? {
        return Err(TlsError::NoPrivateKey(key_path.to_path_buf()));
    }

    let rustls = RustlsConfig::from_pem(cert, key)
        .await
        .map_err(TlsError::Invalid)?;

    tracing::info!(cert = ?cert_path, "TLS configuration loaded");
    Ok(rustls)
}
