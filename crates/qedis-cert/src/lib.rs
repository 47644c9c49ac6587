//! Server identity for the QUIC front end
//!
//! The proxy needs exactly one thing from this crate: a [`Certificate`] (chain plus private
//! key) to terminate TLS 1.3 inside QUIC. An [`IdentityProvider`] produces it, either by
//! generating an ephemeral self-signed certificate or by loading PEM files from disk.
//! Any provider failure is fatal to startup.

pub mod pem;
pub mod self_signed;

pub use pem::{load_certs, load_private_key};
pub use self_signed::{
    generate_self_signed_cert, generate_self_signed_cert_with_names, SelfSignedCertificate,
};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Identity acquisition errors
#[derive(Debug, Error)]
pub enum CertError {
    #[error("Certificate generation failed: {0}")]
    Generation(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse PEM data: {0}")]
    Parse(String),

    #[error("Certificate or key rejected by TLS: {0}")]
    Rejected(String),
}

/// Certificate with private key
#[derive(Debug)]
pub struct Certificate {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub private_key: PrivateKeyDer<'static>,
}

impl Certificate {
    pub fn new(
        cert_chain: Vec<CertificateDer<'static>>,
        private_key: PrivateKeyDer<'static>,
    ) -> Self {
        Self {
            cert_chain,
            private_key,
        }
    }

    /// The leaf certificate, for clients that pin the server identity
    pub fn leaf(&self) -> Option<&CertificateDer<'static>> {
        self.cert_chain.first()
    }
}

impl Clone for Certificate {
    fn clone(&self) -> Self {
        Self {
            cert_chain: self.cert_chain.clone(),
            private_key: self.private_key.clone_key(),
        }
    }
}

/// Source of the server identity
pub trait IdentityProvider: Send + Sync {
    fn provide(&self) -> Result<Certificate, CertError>;
}

/// Generates a fresh self-signed certificate on every call
#[derive(Debug, Clone, Default)]
pub struct SelfSignedIdentity {
    pub extra_names: Vec<String>,
}

impl SelfSignedIdentity {
    pub fn localhost() -> Self {
        Self::default()
    }

    pub fn with_names(extra_names: Vec<String>) -> Self {
        Self { extra_names }
    }
}

impl IdentityProvider for SelfSignedIdentity {
    fn provide(&self) -> Result<Certificate, CertError> {
        let cert = generate_self_signed_cert_with_names(&self.extra_names)?;
        info!("Generated ephemeral self-signed certificate");
        Ok(cert.into_certificate())
    }
}

/// Loads a certificate chain and private key from PEM files
#[derive(Debug, Clone)]
pub struct PemFileIdentity {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl PemFileIdentity {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }
}

impl IdentityProvider for PemFileIdentity {
    fn provide(&self) -> Result<Certificate, CertError> {
        let cert_chain = load_certs(&self.cert_path)?;
        let private_key = load_private_key(&self.key_path)?;
        debug!(
            "Loaded {} certificate(s) from {}",
            cert_chain.len(),
            self.cert_path.display()
        );
        Ok(Certificate::new(cert_chain, private_key))
    }
}
