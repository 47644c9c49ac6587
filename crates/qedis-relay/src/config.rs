//! Proxy configuration resolved from the command line

use qedis_cert::{Certificate, IdentityProvider, PemFileIdentity, SelfSignedIdentity};
use qedis_transport_quic::{QuicConfig, DEFAULT_IDLE_TIMEOUT, DEFAULT_KEEP_ALIVE, DEFAULT_MAX_STREAMS};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ProxyError;
use crate::upstream::{Upstream, UpstreamKind};

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:6379";
pub const DEFAULT_REMOTE_ADDR: &str = "127.0.0.1:6379";

/// Where the server identity comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// Fresh self-signed certificate on every start
    SelfSigned { extra_names: Vec<String> },
    /// PEM certificate chain and key on disk
    PemFiles { cert_path: PathBuf, key_path: PathBuf },
}

impl IdentitySource {
    /// Build from optional `--cert` / `--key` values, which must come together
    pub fn from_paths(
        cert_path: Option<PathBuf>,
        key_path: Option<PathBuf>,
    ) -> Result<Self, ProxyError> {
        match (cert_path, key_path) {
            (Some(cert_path), Some(key_path)) => Ok(IdentitySource::PemFiles {
                cert_path,
                key_path,
            }),
            (None, None) => Ok(IdentitySource::SelfSigned {
                extra_names: Vec::new(),
            }),
            _ => Err(ProxyError::Config(
                "--cert and --key must be given together".to_string(),
            )),
        }
    }

    pub fn provider(&self) -> Box<dyn IdentityProvider> {
        match self {
            IdentitySource::SelfSigned { extra_names } => {
                Box::new(SelfSignedIdentity::with_names(extra_names.clone()))
            }
            IdentitySource::PemFiles {
                cert_path,
                key_path,
            } => Box::new(PemFileIdentity::new(cert_path, key_path)),
        }
    }
}

/// Everything the proxy needs to start
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// UDP address the QUIC listener binds to
    pub listen_addr: String,
    pub upstream: Upstream,
    pub identity: IdentitySource,
    pub alpn_protocols: Vec<String>,
    pub keep_alive_interval: Duration,
    pub max_idle_timeout: Duration,
    pub max_concurrent_streams: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            upstream: Upstream::new(UpstreamKind::Tcp, DEFAULT_REMOTE_ADDR),
            identity: IdentitySource::SelfSigned {
                extra_names: Vec::new(),
            },
            alpn_protocols: Vec::new(),
            keep_alive_interval: DEFAULT_KEEP_ALIVE,
            max_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_concurrent_streams: DEFAULT_MAX_STREAMS,
        }
    }
}

impl ProxyConfig {
    /// QUIC listener configuration terminating TLS with `identity`
    pub fn quic_config(&self, identity: Certificate) -> Result<QuicConfig, ProxyError> {
        let config = QuicConfig::server(identity)
            .with_keep_alive(self.keep_alive_interval)
            .with_idle_timeout(self.max_idle_timeout)
            .with_max_streams(self.max_concurrent_streams)
            .with_alpn_protocols(self.alpn_protocols.clone());

        config
            .validate()
            .map_err(|e| ProxyError::Config(e.to_string()))?;

        Ok(config)
    }
}
