//! QUIC listener and connector implementations

use async_trait::async_trait;
use qedis_transport::{
    TransportConnector, TransportError, TransportListener, TransportResult, GRACEFUL_CLOSE_CODE,
};
use quinn::Endpoint;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::QuicConfig;
use crate::connection::QuicConnection;

type Accepted = TransportResult<(QuicConnection, SocketAddr)>;

/// QUIC listener for accepting incoming connections
///
/// Handshakes run on their own tasks, so `accept()` yields connections in the order their
/// handshakes complete and a stalled handshake never holds up the others.
#[derive(Debug)]
pub struct QuicListener {
    endpoint: Endpoint,
    accepted: Mutex<mpsc::UnboundedReceiver<Accepted>>,
    acceptor: JoinHandle<()>,
    // Kept for potential future revalidation or reconfiguration
    _config: Arc<QuicConfig>,
}

impl QuicListener {
    pub fn new(bind_addr: SocketAddr, config: Arc<QuicConfig>) -> TransportResult<Self> {
        config.validate()?;

        let server_config = config.build_server_config()?;

        let endpoint =
            Endpoint::server(server_config, bind_addr).map_err(TransportError::IoError)?;

        let local_addr = endpoint.local_addr().map_err(TransportError::IoError)?;

        info!("QUIC listener bound to {}", local_addr);

        let (tx, rx) = mpsc::unbounded_channel();
        let acceptor = tokio::spawn(drive_handshakes(endpoint.clone(), tx));

        Ok(Self {
            endpoint,
            accepted: Mutex::new(rx),
            acceptor,
            _config: config,
        })
    }
}

async fn drive_handshakes(endpoint: Endpoint, tx: mpsc::UnboundedSender<Accepted>) {
    while let Some(incoming) = endpoint.accept().await {
        let remote = incoming.remote_address();
        debug!("Incoming QUIC connection from {}", remote);

        let tx = tx.clone();
        tokio::spawn(async move {
            let result = match incoming.await {
                Ok(connection) => {
                    info!("QUIC connection established from {}", remote);
                    Ok((QuicConnection::new(connection), remote))
                }
                Err(e) => Err(TransportError::Handshake {
                    remote,
                    reason: e.to_string(),
                }),
            };
            // Receiver gone means the listener was dropped; the connection goes with it
            let _ = tx.send(result);
        });
    }
    debug!("QUIC endpoint stopped accepting");
}

impl Drop for QuicListener {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

#[async_trait]
impl TransportListener for QuicListener {
    type Connection = QuicConnection;

    async fn accept(&self) -> TransportResult<(Self::Connection, SocketAddr)> {
        match self.accepted.lock().await.recv().await {
            Some(result) => result,
            None => Err(TransportError::EndpointClosed),
        }
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.endpoint.local_addr().map_err(TransportError::IoError)
    }

    async fn close(&self) {
        self.endpoint
            .close(GRACEFUL_CLOSE_CODE.into(), b"Listener closed");
        info!("QUIC listener closed");
    }
}

/// QUIC connector for establishing outgoing connections
#[derive(Debug)]
pub struct QuicConnector {
    endpoint: Endpoint,
    // Kept for potential future reconfiguration
    _config: Arc<QuicConfig>,
}

impl QuicConnector {
    pub fn new(config: Arc<QuicConfig>) -> TransportResult<Self> {
        config.validate()?;

        let client_config = config.build_client_config()?;

        let bind_addr = SocketAddr::from(([0, 0, 0, 0], 0));
        let mut endpoint = Endpoint::client(bind_addr).map_err(TransportError::IoError)?;

        endpoint.set_default_client_config(client_config);

        debug!("QUIC connector created");

        Ok(Self {
            endpoint,
            _config: config,
        })
    }
}

#[async_trait]
impl TransportConnector for QuicConnector {
    type Connection = QuicConnection;

    async fn connect(
        &self,
        addr: SocketAddr,
        server_name: &str,
    ) -> TransportResult<Self::Connection> {
        debug!("Connecting to QUIC server: {} ({})", server_name, addr);

        let connecting = self
            .endpoint
            .connect(addr, server_name)
            .map_err(|e| TransportError::ConnectionError(e.to_string()))?;

        let connection = connecting
            .await
            .map_err(|e| TransportError::ConnectionError(e.to_string()))?;

        info!("QUIC connection established to {} ({})", server_name, addr);

        Ok(QuicConnection::new(connection))
    }
}
