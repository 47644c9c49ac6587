//! Transport abstraction for the proxy front end
//!
//! The relay core only needs three capabilities from the encrypted multiplexed transport:
//! accept connections, accept logical streams from a connection, and treat each logical
//! stream as a plain duplex byte pipe. These traits capture exactly that, so the session
//! and server loops can be exercised against in-memory mocks as well as real QUIC.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        qedis-relay (server, session, stream relay)      │
//! └─────────────────────────────────────────────────────────┘
//!                           │ uses traits
//!                           ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │            qedis-transport (this crate)                 │
//! │  - TransportListener    - TransportConnection           │
//! │  - TransportStream      - TransportConnector            │
//! └─────────────────────────────────────────────────────────┘
//!                           │ implemented by
//!                           ↓
//!                 qedis-transport-quic (quinn)
//! ```

use async_trait::async_trait;
use std::fmt::Debug;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Application close code a peer uses to end a connection in an orderly way
pub const GRACEFUL_CLOSE_CODE: u32 = 0;

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Handshake with {remote} failed: {reason}")]
    Handshake { remote: SocketAddr, reason: String },

    #[error("Endpoint closed")]
    EndpointClosed,

    #[error("Connection closed by peer with application code {code}: {reason}")]
    ApplicationClosed { code: u64, reason: String },

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl TransportError {
    /// Whether a listener can keep accepting after this error
    ///
    /// Only a closed endpoint ends an accept loop; everything else is scoped to the one
    /// connection attempt that produced it.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::EndpointClosed)
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// One logical stream: an independently flow-controlled duplex byte channel
///
/// Shutting down the write half signals end-of-data to the peer; dropping the stream
/// releases both directions.
pub trait TransportStream: AsyncRead + AsyncWrite + Unpin + Send + Debug + 'static {
    /// Stream ID, unique within its connection
    fn stream_id(&self) -> u64;
}

/// A multiplexed connection carrying many logical streams
#[async_trait]
pub trait TransportConnection: Send + Sync + Debug {
    /// The stream type carried by this connection
    type Stream: TransportStream;

    /// Open a new bidirectional stream
    async fn open_stream(&self) -> TransportResult<Self::Stream>;

    /// Accept the next bidirectional stream opened by the peer
    ///
    /// Returns `Ok(None)` once the connection has been closed gracefully, i.e. the peer closed
    /// it with [`GRACEFUL_CLOSE_CODE`] or it was closed locally. Any other termination is an
    /// error.
    async fn accept_stream(&self) -> TransportResult<Option<Self::Stream>>;

    /// Close the connection
    ///
    /// # Arguments
    /// * `error_code` - Application-specific error code ([`GRACEFUL_CLOSE_CODE`] for normal closure)
    /// * `reason` - Human-readable reason for closure
    async fn close(&self, error_code: u32, reason: &str);

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;

    /// Get the remote peer address
    fn remote_address(&self) -> SocketAddr;

    /// Stable identifier for logging and correlation
    fn connection_id(&self) -> String;
}

/// Server side: accepts incoming connections
#[async_trait]
pub trait TransportListener: Send + Sync + Debug {
    /// The connection type accepted by this listener
    type Connection: TransportConnection + 'static;

    /// Accept an incoming, fully established connection
    ///
    /// Errors for which [`TransportError::is_transient`] holds concern a single connection
    /// attempt; the listener remains usable.
    async fn accept(&self) -> TransportResult<(Self::Connection, SocketAddr)>;

    /// Get the local address this listener is bound to
    fn local_addr(&self) -> TransportResult<SocketAddr>;

    /// Close the listener (stop accepting new connections)
    async fn close(&self);
}

/// Client side: establishes outgoing connections
#[async_trait]
pub trait TransportConnector: Send + Sync + Debug {
    /// The connection type created by this connector
    type Connection: TransportConnection;

    /// Connect to a remote server
    ///
    /// # Arguments
    /// * `addr` - The socket address to connect to
    /// * `server_name` - The server name for TLS verification
    async fn connect(&self, addr: SocketAddr, server_name: &str)
        -> TransportResult<Self::Connection>;
}

/// Configuration for transport security
#[derive(Debug, Clone)]
pub struct TransportSecurityConfig {
    /// Whether to verify the server's TLS certificate (client side)
    pub verify_server_cert: bool,

    /// Custom root CA certificates in DER form (if not using system roots)
    pub root_certs: Vec<Vec<u8>>,

    /// Application-Layer Protocol Negotiation (ALPN) protocols, empty to accept any
    pub alpn_protocols: Vec<String>,
}

impl Default for TransportSecurityConfig {
    fn default() -> Self {
        Self {
            verify_server_cert: true,
            root_certs: Vec::new(),
            alpn_protocols: Vec::new(),
        }
    }
}
