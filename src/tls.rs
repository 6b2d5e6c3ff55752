/*!
 * @file tls.rs
 * @brief Test-convenience TLS configuration loading
 */

use crate::error::{MockError, Result};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

/// Builds a `rustls::ServerConfig` from a PEM certificate chain and private
/// key file, for tests that want to exercise [`crate::server::MockServer::with_tls`]
/// without hand-rolling rustls setup.
pub fn load_test_tls_config(
    cert_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
) -> Result<Arc<rustls::ServerConfig>> {
    let cert_file = std::fs::File::open(cert_path)?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .map_err(|e| MockError::Tls(e.to_string()))?
        .into_iter()
        .map(rustls::Certificate)
        .collect();

    let key_file = std::fs::File::open(key_path)?;
    let mut key_reader = BufReader::new(key_file);
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut key_reader)
        .map_err(|e| MockError::Tls(e.to_string()))?;
    let key = keys
        .pop()
        .ok_or_else(|| MockError::Tls("no private key found in file".to_string()))?;

    let config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, rustls::PrivateKey(key))
        .map_err(|e| MockError::Tls(e.to_string()))?;

    Ok(Arc::new(config))
}
