//! Server certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls_pemfile::{certs, private_key};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tracing::{info, warn};

use super::config::ListenerConfig;
use super::error::{ListenerError, ListenerResult};

/// Build the rustls server configuration for the listener.
///
/// Loads the configured PEM certificate and key; when neither is configured,
/// falls back to a freshly generated self-signed localhost certificate so a
/// development instance can start without ceremony.
///
/// # Errors
///
/// Returns an error when a configured file cannot be read or parsed, or
/// when the certificate and key do not form a usable identity.
pub fn load_server_config(config: &ListenerConfig) -> ListenerResult<Arc<ServerConfig>> {
    let (chain, key) = match (&config.cert_path, &config.key_path) {
        (Some(cert_path), Some(key_path)) => {
            info!(
                cert = %cert_path.display(),
                key = %key_path.display(),
                "loading TLS identity"
            );
            (load_certificates(cert_path)?, load_private_key(key_path)?)
        }
        _ => {
            warn!("no certificate configured; generating a self-signed localhost certificate");
            self_signed_identity()?
        }
    };

    let server = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .map_err(|error| ListenerError::TlsSetup(error.to_string()))?;

    Ok(Arc::new(server))
}

/// Load a PEM certificate chain.
fn load_certificates(path: &Path) -> ListenerResult<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|error| ListenerError::CertificateLoadError {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    let mut reader = BufReader::new(file);

    let chain: Vec<CertificateDer<'static>> = certs(&mut reader)
        .collect::<Result<_, _>>()
        .map_err(|error| ListenerError::CertificateLoadError {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;

    if chain.is_empty() {
        return Err(ListenerError::CertificateLoadError {
            path: path.to_path_buf(),
            message: "no certificates found in file".to_string(),
        });
    }

    Ok(chain)
}

/// Load a PEM private key.
fn load_private_key(path: &Path) -> ListenerResult<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|error| ListenerError::KeyLoadError {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    let mut reader = BufReader::new(file);

    private_key(&mut reader)
        .map_err(|error| ListenerError::KeyLoadError {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?
        .ok_or_else(|| ListenerError::KeyLoadError {
            path: path.to_path_buf(),
            message: "no private key found in file".to_string(),
        })
}

/// Generate a self-signed identity for localhost use.
fn self_signed_identity(
) -> ListenerResult<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let names = vec!["localhost".to_string(), "127.0.0.1".to_string()];
    let CertifiedKey { cert, key_pair } = generate_simple_self_signed(names)
        .map_err(|error| ListenerError::TlsSetup(error.to_string()))?;

    let cert_der = CertificateDer::from(cert.der().to_vec());
    let key_der = PrivateKeyDer::try_from(key_pair.serialize_der())
        .map_err(|error| ListenerError::TlsSetup(error.to_string()))?;

    Ok((vec![cert_der], key_der))
}
