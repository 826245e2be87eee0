// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

//! Loading of PEM certificates and keys for the webhook listener and the collector client.
//!
//! Both sides use the `ring` provider explicitly so the process never depends on a
//! globally installed rustls provider.

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::config::ConfigError;

fn tls_error(path: &Path, reason: impl Display) -> ConfigError {
    ConfigError::Tls {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|e| tls_error(path, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(path, e))?;
    if certs.is_empty() {
        return Err(tls_error(path, "no certificate found"));
    }
    Ok(certs)
}

fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConfigError> {
    PrivateKeyDer::from_pem_file(path).map_err(|e| tls_error(path, e))
}

/// Builds the listener configuration from a PEM certificate chain and its private key
/// (PKCS#8, PKCS#1 or SEC1).
pub fn load_server_config(cert: &Path, key: &Path) -> Result<Arc<ServerConfig>, ConfigError> {
    let certs = read_certificates(cert)?;
    let private_key = read_private_key(key)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| tls_error(cert, e))?
        .with_no_client_auth()
        .with_single_cert(certs, private_key)
        .map_err(|e| tls_error(key, e))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

/// Builds the client identity presented to the event collector for mutual TLS.
pub fn load_client_identity(cert: &Path, key: &Path) -> Result<reqwest::Identity, ConfigError> {
    // parse both files first so a bad file is reported by name
    read_certificates(cert)?;
    read_private_key(key)?;

    let mut pem = std::fs::read(cert).map_err(|e| tls_error(cert, e))?;
    if !pem.ends_with(b"\n") {
        pem.push(b'\n');
    }
    pem.extend(std::fs::read(key).map_err(|e| tls_error(key, e))?);

    reqwest::Identity::from_pem(&pem).map_err(|e| tls_error(cert, e))
}
