//! Proxy error taxonomy
//!
//! Only [`ProxyError::Credential`], [`ProxyError::Bind`] and [`ProxyError::Config`] are fatal;
//! they are returned before the accept loop starts. Every other variant is handled (logged)
//! at the narrowest scope it occurs in and never escalates.

use qedis_cert::CertError;
use qedis_transport::TransportError;
use thiserror::Error;

use crate::upstream::UpstreamKind;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Server identity unavailable: {0}")]
    Credential(#[from] CertError),

    #[error("Failed to bind {address}: {reason}")]
    Bind { address: String, reason: String },

    #[error("Failed to accept connection: {0}")]
    Accept(#[source] TransportError),

    #[error("Failed to accept stream: {0}")]
    Demultiplex(#[source] TransportError),

    #[error("Failed to dial {kind} upstream {address}: {source}")]
    Dial {
        kind: UpstreamKind,
        address: String,
        source: std::io::Error,
    },

    #[error("Relay failed: {0}")]
    Relay(#[source] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ProxyError {
    /// Whether this error must stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProxyError::Credential(_) | ProxyError::Bind { .. } | ProxyError::Config(_)
        )
    }
}
