//! Session handler: demultiplexes one front-end connection into logical streams

use qedis_transport::{TransportConnection, TransportStream};
use std::sync::Arc;
use tracing::{debug, debug_span, error, Instrument};

use crate::error::ProxyError;
use crate::handler::handle_stream;
use crate::upstream::Upstream;

/// Why a session stopped accepting streams
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer closed the connection in an orderly way (or we closed it locally)
    PeerClosed,
    /// The connection failed or was closed abnormally
    Failed(ProxyError),
}

/// Accept logical streams from `connection` until it closes, dispatching each to its own task
///
/// Never waits for dispatched streams. Streams still relaying when the session ends keep
/// running until their own relay finishes.
pub async fn run_session<C>(connection: C, upstream: Arc<Upstream>) -> SessionEnd
where
    C: TransportConnection + 'static,
{
    let connection_id = connection.connection_id();
    let remote = connection.remote_address();

    loop {
        match connection.accept_stream().await {
            Ok(Some(stream)) => {
                let stream_id = stream.stream_id();
                debug!(connection_id = %connection_id, stream_id, "Accepted stream");

                let upstream = upstream.clone();
                let span = debug_span!("stream", connection_id = %connection_id, stream_id);
                tokio::spawn(
                    async move {
                        handle_stream(stream, &upstream).await;
                    }
                    .instrument(span),
                );
            }
            Ok(None) => {
                debug!(connection_id = %connection_id, remote = %remote, "Session closed by peer");
                return SessionEnd::PeerClosed;
            }
            Err(e) => {
                let err = ProxyError::Demultiplex(e);
                error!(connection_id = %connection_id, remote = %remote, "{}", err);
                return SessionEnd::Failed(err);
            }
        }
    }
}
