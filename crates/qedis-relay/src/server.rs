//! Accept loop: one session per front-end connection

use qedis_cert::CertError;
use qedis_transport::{TransportConnection, TransportError, TransportListener, TransportResult};
use qedis_transport_quic::QuicListener;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::session::{run_session, SessionEnd};
use crate::upstream::Upstream;

/// What one `accept` call produced
#[derive(Debug)]
pub enum AcceptStep<C> {
    Accepted(C, SocketAddr),
    /// A single connection failed (e.g. its handshake); keep accepting
    Transient(TransportError),
    /// The listener can no longer produce connections
    Terminated,
}

impl<C> From<TransportResult<(C, SocketAddr)>> for AcceptStep<C> {
    fn from(result: TransportResult<(C, SocketAddr)>) -> Self {
        match result {
            Ok((conn, remote)) => AcceptStep::Accepted(conn, remote),
            Err(e) if e.is_transient() => AcceptStep::Transient(e),
            Err(_) => AcceptStep::Terminated,
        }
    }
}

/// Proxy server bridging front-end connections to a fixed upstream
pub struct ProxyServer<L: TransportListener> {
    listener: L,
    upstream: Arc<Upstream>,
}

impl<L> ProxyServer<L>
where
    L: TransportListener,
{
    pub fn new(listener: L, upstream: Upstream) -> Self {
        Self {
            listener,
            upstream: Arc::new(upstream),
        }
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProxyError> {
        self.listener.local_addr().map_err(|e| ProxyError::Bind {
            address: "listener".to_string(),
            reason: e.to_string(),
        })
    }

    /// Accept connections until the listener terminates
    pub async fn serve(&self) -> Result<(), ProxyError> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Accept connections until the listener terminates or `shutdown` resolves
    ///
    /// Per-connection failures are logged and never end the loop. Sessions already
    /// running are not waited for. The listener is closed on the way out.
    pub async fn serve_with_shutdown<F>(&self, shutdown: F) -> Result<(), ProxyError>
    where
        F: Future<Output = ()>,
    {
        let local_addr = self.local_addr()?;
        info!("Listening on: quic {}", local_addr);
        info!("Proxying to: {}", self.upstream);

        tokio::pin!(shutdown);

        loop {
            let step = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                result = self.listener.accept() => AcceptStep::from(result),
            };

            match step {
                AcceptStep::Accepted(connection, remote) => {
                    let connection_id = connection.connection_id();
                    debug!(connection_id = %connection_id, remote = %remote, "Accepted connection");

                    let upstream = self.upstream.clone();
                    let span = info_span!("session", connection_id = %connection_id, remote = %remote);
                    tokio::spawn(
                        async move {
                            match run_session(connection, upstream).await {
                                SessionEnd::PeerClosed => debug!("Session finished"),
                                SessionEnd::Failed(e) => debug!("Session ended: {}", e),
                            }
                        }
                        .instrument(span),
                    );
                }
                AcceptStep::Transient(e) => {
                    error!("{}", ProxyError::Accept(e));
                }
                AcceptStep::Terminated => {
                    info!("Listener terminated");
                    break;
                }
            }
        }

        self.listener.close().await;
        Ok(())
    }
}

impl ProxyServer<QuicListener> {
    /// Obtain the identity, bind the QUIC listener and return a server ready to serve
    pub async fn bind(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let bind_addr = resolve(&config.listen_addr).await?;

        let identity = config.identity.provider().provide()?;
        let quic_config = Arc::new(config.quic_config(identity)?);

        let listener = QuicListener::new(bind_addr, quic_config).map_err(|e| match e {
            TransportError::IoError(e) => ProxyError::Bind {
                address: bind_addr.to_string(),
                reason: e.to_string(),
            },
            TransportError::TlsError(reason) => {
                ProxyError::Credential(CertError::Rejected(reason))
            }
            other => ProxyError::Config(other.to_string()),
        })?;

        Ok(Self::new(listener, config.upstream.clone()))
    }
}

async fn resolve(address: &str) -> Result<SocketAddr, ProxyError> {
    let bind_error = |reason: String| ProxyError::Bind {
        address: address.to_string(),
        reason,
    };

    tokio::net::lookup_host(address)
        .await
        .map_err(|e| bind_error(e.to_string()))?
        .next()
        .ok_or_else(|| bind_error("address resolved to nothing".to_string()))
}
