use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::digest::{digest, SHA256};
use std::path::Path;
use tracing::info;
use wtransport::Identity;

use crate::config::ServerConfig;

// Written by `scripts/gen-dev-cert`
const DEV_CERT_FILE: &str = "certs/cert.pem";
const DEV_KEY_FILE: &str = "certs/key.pem";

/// Identity presented to WebTransport observers
pub struct TlsConfig {
    pub identity: Identity,
    /// Base64 SHA-256 of the leaf certificate, for `serverCertificateHashes`
    pub cert_hash: String,
}

impl TlsConfig {
    /// Load the certificate named by the server config, falling back to the
    /// development pair under `certs/`
    pub async fn load(config: &ServerConfig) -> Result<Self> {
        if let (Some(cert_path), Some(key_path)) = (&config.tls_cert_path, &config.tls_key_path) {
            info!("Loading TLS certificate from {}", cert_path);
            return Self::load_from_paths(cert_path, key_path).await;
        }

        if Path::new(DEV_CERT_FILE).exists() && Path::new(DEV_KEY_FILE).exists() {
            info!("Loading dev certificate from certs/");
            Self::load_from_paths(DEV_CERT_FILE, DEV_KEY_FILE).await
        } else {
            Err(anyhow!(
                "TLS certificate not found.\n\n\
                For development: run `cargo run --manifest-path scripts/Cargo.toml` to generate certs/.\n\
                For production: set TLS_CERT_PATH and TLS_KEY_PATH."
            ))
        }
    }

    pub async fn load_from_paths(cert_path: &str, key_path: &str) -> Result<Self> {
        let identity = Identity::load_pemfiles(cert_path, key_path)
            .await
            .with_context(|| format!("Failed to load certificate from {} / {}", cert_path, key_path))?;

        let cert_hash = identity
            .certificate_chain()
            .as_slice()
            .first()
            .map(|cert| cert_der_hash(cert.der()))
            .unwrap_or_default();

        Ok(Self {
            identity,
            cert_hash,
        })
    }

    pub fn cert_hash(&self) -> &str {
        &self.cert_hash
    }
}

/// Base64 SHA-256 digest of a DER certificate
pub fn cert_der_hash(der: &[u8]) -> String {
    STANDARD.encode(digest(&SHA256, der).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cert_der_hash_known_digest() {
        assert_eq!(
            cert_der_hash(&[]),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn test_cert_der_hash_is_32_bytes() {
        let decoded = STANDARD.decode(cert_der_hash(b"not really a certificate")).unwrap();
        assert_eq!(decoded.len(), 32);
    }

    #[tokio::test]
    async fn test_missing_paths_error() {
        let result = TlsConfig::load_from_paths("/nonexistent/cert.pem", "/nonexistent/key.pem").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires certs/ from scripts/gen-dev-cert
    async fn test_load_dev_cert() {
        let config = TlsConfig::load(&ServerConfig::default()).await.unwrap();
        assert_eq!(STANDARD.decode(config.cert_hash()).unwrap().len(), 32);
    }
}
