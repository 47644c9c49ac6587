//! QUIC front-end transport using quinn
//!
//! Terminates QUIC (TLS 1.3 inside) and exposes every bidirectional stream as a plain
//! duplex byte pipe ([`QuicStream`]) through the `qedis-transport` traits.
//!
//! # Closure semantics
//!
//! [`QuicConnection::accept_stream`](qedis_transport::TransportConnection::accept_stream)
//! returns `Ok(None)` when the peer closes the connection with application error code `0`
//! (or when we closed it locally). A non-zero application code surfaces as
//! `TransportError::ApplicationClosed`; idle timeouts, resets and transport-level closes
//! surface as `TransportError::ConnectionLost`.
//!
//! # Example
//!
//! ```no_run
//! use qedis_cert::{IdentityProvider, SelfSignedIdentity};
//! use qedis_transport_quic::{QuicConfig, QuicListener};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = SelfSignedIdentity::localhost().provide()?;
//! let config = Arc::new(QuicConfig::server(identity));
//! let listener = QuicListener::new("0.0.0.0:6379".parse()?, config)?;
//! # Ok(())
//! # }
//! ```

// Initialize rustls crypto provider once globally
// This MUST be called before any rustls/QUIC operations
static CRYPTO_PROVIDER_INIT: std::sync::Once = std::sync::Once::new();

fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            // Provider already installed by another crate, this is fine
            tracing::debug!("Rustls crypto provider already installed");
        }
    });
}

pub mod config;
pub mod connection;
pub mod listener;
pub mod stream;

pub use config::{QuicConfig, DEFAULT_IDLE_TIMEOUT, DEFAULT_KEEP_ALIVE, DEFAULT_MAX_STREAMS};
pub use connection::QuicConnection;
pub use listener::{QuicConnector, QuicListener};
pub use stream::QuicStream;
