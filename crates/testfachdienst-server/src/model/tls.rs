//! TLS configuration for the HTTP server
//!
//! Builds a rustls `ServerConfig` from PEM files, optionally requiring client
//! certificates signed by a configured CA (mTLS).

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use rustls::RootCertStore;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;

/// TLS configuration of the main HTTP server
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Serve HTTPS instead of plain HTTP
    pub enabled: bool,
    /// Path to the server certificate chain (PEM format)
    pub cert_path: Option<PathBuf>,
    /// Path to the server private key (PEM format)
    pub key_path: Option<PathBuf>,
    /// Path to the CA certificate for client verification (mTLS)
    pub ca_cert_path: Option<PathBuf>,
    /// Require client certificates
    pub mtls_enabled: bool,
}

impl TlsConfig {
    /// Check if certificate and key are configured
    pub fn is_configured(&self) -> bool {
        self.cert_path.is_some() && self.key_path.is_some()
    }

    /// Check if mTLS is properly configured
    pub fn is_mtls_configured(&self) -> bool {
        self.mtls_enabled && self.is_configured() && self.ca_cert_path.is_some()
    }

    /// Build the rustls server configuration
    pub fn create_server_config(&self) -> anyhow::Result<rustls::ServerConfig> {
        let (Some(cert_path), Some(key_path)) = (&self.cert_path, &self.key_path) else {
            anyhow::bail!("TLS is enabled but certificate or key path is not configured");
        };

        let certs = load_certs(cert_path)?;
        let key = load_private_key(key_path)?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;

        let builder = match (&self.ca_cert_path, self.mtls_enabled) {
            (Some(ca_path), true) => {
                let verifier = client_verifier(ca_path, provider)?;
                builder.with_client_cert_verifier(verifier)
            }
            _ => builder.with_no_client_auth(),
        };

        Ok(builder.with_single_cert(certs, key)?)
    }
}

fn client_verifier(
    ca_path: &Path,
    provider: Arc<CryptoProvider>,
) -> anyhow::Result<Arc<dyn rustls::server::danger::ClientCertVerifier>> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(ca_path)? {
        roots.add(cert)?;
    }
    Ok(WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider).build()?)
}

/// Load every certificate of a PEM file
pub fn load_certs(path: &Path) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).with_context(|| format!("Certificate file not found: {:?}", path))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid certificate file: {:?}", path))?;

    if certs.is_empty() {
        anyhow::bail!("No certificates found in {:?}", path);
    }
    Ok(certs)
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) of a PEM file
pub fn load_private_key(path: &Path) -> anyhow::Result<PrivateKeyDer<'static>> {
    let file = File::open(path).with_context(|| format!("Private key file not found: {:?}", path))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .with_context(|| format!("Invalid private key file: {:?}", path))?
        .ok_or_else(|| anyhow::anyhow!("No private key found in {:?}", path))
}

/// Result of TLS configuration validation
#[derive(Debug)]
pub struct TlsValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl TlsValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: &str) {
        self.valid = false;
        self.errors.push(error.to_string());
    }

    pub fn add_warning(&mut self, warning: &str) {
        self.warnings.push(warning.to_string());
    }
}

impl Default for TlsValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate TLS configuration before binding
pub fn validate_tls_config(config: &TlsConfig) -> TlsValidationResult {
    let mut result = TlsValidationResult::new();

    if config.enabled {
        match &config.cert_path {
            None => result.add_error("TLS is enabled but certificate path is not configured"),
            Some(path) if !path.exists() => {
                result.add_error(&format!("Certificate file not found: {:?}", path))
            }
            _ => {}
        }
        match &config.key_path {
            None => result.add_error("TLS is enabled but private key path is not configured"),
            Some(path) if !path.exists() => {
                result.add_error(&format!("Private key file not found: {:?}", path))
            }
            _ => {}
        }
    }

    if config.mtls_enabled {
        if !config.enabled {
            result.add_warning("mTLS is enabled but TLS is not enabled");
        }
        match &config.ca_cert_path {
            None => result.add_error("mTLS is enabled but CA certificate path is not configured"),
            Some(path) if !path.exists() => {
                result.add_error(&format!("CA certificate file not found: {:?}", path))
            }
            _ => {}
        }
    }

    result
}
