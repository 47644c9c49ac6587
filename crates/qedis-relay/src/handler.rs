//! Stream handler: one logical stream, one fresh upstream connection

use qedis_transport::TransportStream;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use crate::error::ProxyError;
use crate::relay::{relay, RelayOutcome};
use crate::upstream::Upstream;

/// How a stream handler ended
#[derive(Debug)]
pub enum StreamOutcome {
    /// The upstream could not be reached; the logical stream was closed without relaying
    DialFailed(ProxyError),
    /// The relay ran and both ends were released
    Relayed(RelayOutcome),
}

/// Bridge `stream` to a newly dialed upstream connection
///
/// There are no retries: a dial failure or a mid-stream failure ends this stream only.
pub async fn handle_stream<S>(mut stream: S, upstream: &Upstream) -> StreamOutcome
where
    S: TransportStream,
{
    let stream_id = stream.stream_id();

    let upstream_conn = match upstream.dial().await {
        Ok(conn) => conn,
        Err(e) => {
            error!(stream_id, upstream = %upstream, "Error dialing upstream: {}", e);
            let _ = stream.shutdown().await;
            drop(stream);
            return StreamOutcome::DialFailed(e);
        }
    };

    debug!(stream_id, upstream = %upstream, "Relaying stream");
    let outcome = relay(stream, upstream_conn).await;

    match &outcome.result {
        Ok(bytes) => debug!(
            stream_id,
            first = outcome.first.as_str(),
            bytes,
            "Stream relay finished"
        ),
        Err(e) => debug!(
            stream_id,
            first = outcome.first.as_str(),
            error = %e,
            "Stream relay ended on error"
        ),
    }

    StreamOutcome::Relayed(outcome)
}
