//! QUIC to TCP/Unix byte relay
//!
//! A [`ProxyServer`] accepts encrypted multiplexed connections from a
//! [`TransportListener`](qedis_transport::TransportListener). Every logical stream opened
//! on a connection is bridged to its own freshly dialed [`Upstream`] connection and bytes
//! are copied both ways until either side finishes.
//!
//! ```no_run
//! use qedis_relay::{ProxyConfig, ProxyServer, Upstream};
//!
//! # async fn run() -> Result<(), qedis_relay::ProxyError> {
//! let config = ProxyConfig {
//!     listen_addr: "0.0.0.0:6380".to_string(),
//!     upstream: Upstream::tcp("127.0.0.1:6379"),
//!     ..ProxyConfig::default()
//! };
//! let server = ProxyServer::bind(&config).await?;
//! server.serve().await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod relay;
pub mod server;
pub mod session;
pub mod upstream;

#[cfg(test)]
mod test_support;

pub use config::{IdentitySource, ProxyConfig};
pub use error::ProxyError;
pub use handler::{handle_stream, StreamOutcome};
pub use relay::{relay, Direction, RelayOutcome, RelayState};
pub use server::{AcceptStep, ProxyServer};
pub use session::{run_session, SessionEnd};
pub use upstream::{Upstream, UpstreamKind, UpstreamStream};
