//! QUIC connection implementation

use async_trait::async_trait;
use qedis_transport::{
    TransportConnection, TransportError, TransportResult, GRACEFUL_CLOSE_CODE,
};
use quinn::{Connection, ConnectionError, VarInt};
use std::net::SocketAddr;
use tracing::{debug, trace};

use crate::stream::QuicStream;

/// QUIC connection wrapper
#[derive(Debug, Clone)]
pub struct QuicConnection {
    inner: Connection,
    connection_id: String,
}

impl QuicConnection {
    pub fn new(connection: Connection) -> Self {
        let connection_id = format!("quic-{}", connection.stable_id());

        Self {
            inner: connection,
            connection_id,
        }
    }
}

/// Classify why a connection stopped yielding streams
///
/// Only an application close carrying [`GRACEFUL_CLOSE_CODE`], or our own local close, is an
/// orderly end. Everything else is reported as an error.
pub(crate) fn classify_close(error: ConnectionError) -> TransportResult<()> {
    match error {
        ConnectionError::ApplicationClosed(close)
            if close.error_code == VarInt::from_u32(GRACEFUL_CLOSE_CODE) =>
        {
            Ok(())
        }
        ConnectionError::LocallyClosed => Ok(()),
        ConnectionError::ApplicationClosed(close) => Err(TransportError::ApplicationClosed {
            code: close.error_code.into_inner(),
            reason: String::from_utf8_lossy(&close.reason).into_owned(),
        }),
        other => Err(TransportError::ConnectionLost(other.to_string())),
    }
}

#[async_trait]
impl TransportConnection for QuicConnection {
    type Stream = QuicStream;

    async fn open_stream(&self) -> TransportResult<Self::Stream> {
        let (send, recv) = self
            .inner
            .open_bi()
            .await
            .map_err(|e| TransportError::ConnectionError(e.to_string()))?;

        trace!("Opened bidirectional stream: {}", send.id().index());

        Ok(QuicStream::new(send, recv))
    }

    async fn accept_stream(&self) -> TransportResult<Option<Self::Stream>> {
        match self.inner.accept_bi().await {
            Ok((send, recv)) => {
                trace!("Accepted bidirectional stream: {}", send.id().index());
                Ok(Some(QuicStream::new(send, recv)))
            }
            Err(e) => {
                debug!("Connection {} stopped accepting streams: {}", self.connection_id, e);
                classify_close(e).map(|()| None)
            }
        }
    }

    async fn close(&self, error_code: u32, reason: &str) {
        self.inner
            .close(VarInt::from_u32(error_code), reason.as_bytes());

        debug!(
            "QUIC connection {} closed: {} (code: {})",
            self.connection_id, reason, error_code
        );
    }

    fn is_closed(&self) -> bool {
        self.inner.close_reason().is_some()
    }

    fn remote_address(&self) -> SocketAddr {
        self.inner.remote_address()
    }

    fn connection_id(&self) -> String {
        self.connection_id.clone()
    }
}
