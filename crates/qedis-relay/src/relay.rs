//! Bidirectional stream relay with first-finisher teardown
//!
//! Two copy tasks run concurrently, one per direction. The first one to finish, whether
//! on end-of-data or on an error, fills a single-slot completion signal; the relay then
//! aborts the other direction and drops both ends.
//!
//! A peer that half-closes (shuts down only its write side) therefore ends the whole relay:
//! bytes the other side would have sent afterwards are discarded. Proxies that preserve
//! half-close keep copying the remaining direction; this one does not.

use std::io;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::ProxyError;

/// Copy direction within a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Logical stream to upstream connection
    ClientToUpstream,
    /// Upstream connection to logical stream
    UpstreamToClient,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToUpstream => "client->upstream",
            Direction::UpstreamToClient => "upstream->client",
        }
    }
}

/// Lifecycle of one relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Both directions copying
    Running,
    /// One direction finished; the other is being torn down
    OneSideFinished(Direction),
    /// Both ends released
    TornDown,
}

impl RelayState {
    /// A copy task reported completion. Only the first report moves the state.
    pub fn on_copy_finished(self, direction: Direction) -> Self {
        match self {
            RelayState::Running => RelayState::OneSideFinished(direction),
            other => other,
        }
    }

    /// Both copy tasks are gone and both ends have been dropped
    pub fn on_teardown(self) -> Self {
        RelayState::TornDown
    }
}

/// How a relay ended
#[derive(Debug)]
pub struct RelayOutcome {
    /// The direction that finished first and triggered teardown
    pub first: Direction,
    /// Bytes that direction copied, or the read/write error that stopped it
    pub result: io::Result<u64>,
}

impl RelayOutcome {
    /// The first finisher reached end-of-data rather than an error
    pub fn is_clean(&self) -> bool {
        self.result.is_ok()
    }

    /// Bytes copied by the first finisher, or its failure as a [`ProxyError::Relay`]
    pub fn into_result(self) -> Result<u64, ProxyError> {
        self.result.map_err(ProxyError::Relay)
    }
}

struct CopyReport {
    direction: Direction,
    result: io::Result<u64>,
}

/// Single-slot completion signal shared by the two copy tasks
#[derive(Clone)]
struct CompletionSlot {
    inner: Arc<Mutex<Option<oneshot::Sender<CopyReport>>>>,
}

impl CompletionSlot {
    fn new() -> (Self, oneshot::Receiver<CopyReport>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                inner: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Returns false if the other direction already finished
    fn finish(&self, report: CopyReport) -> bool {
        let sender = match self.inner.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => tx.send(report).is_ok(),
            None => false,
        }
    }
}

async fn copy_one_way<R, W>(direction: Direction, mut reader: R, mut writer: W, slot: CompletionSlot)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = tokio::io::copy(&mut reader, &mut writer).await;
    if result.is_ok() {
        let _ = writer.shutdown().await;
    }
    trace!(direction = direction.as_str(), result = ?result, "Copy finished");

    if !slot.finish(CopyReport { direction, result }) {
        trace!(direction = direction.as_str(), "Other direction finished first");
    }
}

/// Relay bytes between `client` and `upstream` until either direction finishes
///
/// Takes ownership of both ends; both are released (dropped) before this returns.
pub async fn relay<A, B>(client: A, upstream: B) -> RelayOutcome
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let mut state = RelayState::Running;

    let (client_read, client_write) = tokio::io::split(client);
    let (upstream_read, upstream_write) = tokio::io::split(upstream);
    let (slot, first_finished) = CompletionSlot::new();

    let to_upstream = tokio::spawn(copy_one_way(
        Direction::ClientToUpstream,
        client_read,
        upstream_write,
        slot.clone(),
    ));
    let to_client = tokio::spawn(copy_one_way(
        Direction::UpstreamToClient,
        upstream_read,
        client_write,
        slot,
    ));

    let report = first_finished.await.unwrap_or_else(|_| CopyReport {
        // Both tasks dropped the slot without reporting, i.e. both panicked
        direction: Direction::ClientToUpstream,
        result: Err(io::Error::new(
            io::ErrorKind::Other,
            "copy tasks ended without reporting",
        )),
    });
    state = state.on_copy_finished(report.direction);
    trace!(state = ?state, "Relay tearing down");

    to_upstream.abort();
    to_client.abort();
    let _ = to_upstream.await;
    let _ = to_client.await;

    state = state.on_teardown();
    trace!(state = ?state, "Relay finished");

    RelayOutcome {
        first: report.direction,
        result: report.result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, ReadBuf};
    use tokio::time::timeout;

    /// Stream whose reads fail immediately and whose writes never complete
    struct BrokenStream;

    impl AsyncRead for BrokenStream {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()))
        }
    }

    impl AsyncWrite for BrokenStream {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Pending
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn test_state_transitions() {
        let state = RelayState::Running.on_copy_finished(Direction::UpstreamToClient);
        assert_eq!(state, RelayState::OneSideFinished(Direction::UpstreamToClient));

        // A late report from the other direction does not change the winner
        let state = state.on_copy_finished(Direction::ClientToUpstream);
        assert_eq!(state, RelayState::OneSideFinished(Direction::UpstreamToClient));

        assert_eq!(state.on_teardown(), RelayState::TornDown);
    }

    #[tokio::test]
    async fn test_bytes_flow_in_order_both_ways() {
        let (mut client_peer, client_side) = duplex(64);
        let (upstream_side, mut upstream_peer) = duplex(64);
        let relay_task = tokio::spawn(relay(client_side, upstream_side));

        // Larger than the duplex buffers to force several copy rounds
        let request: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let writer = {
            let request = request.clone();
            tokio::spawn(async move {
                client_peer.write_all(&request).await.unwrap();
                client_peer
            })
        };
        let mut received = vec![0u8; request.len()];
        upstream_peer.read_exact(&mut received).await.unwrap();
        assert_eq!(received, request);
        let mut client_peer = writer.await.unwrap();

        upstream_peer.write_all(b"+OK\r\n").await.unwrap();
        let mut reply = [0u8; 5];
        client_peer.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"+OK\r\n");

        drop(client_peer);
        let outcome = timeout(Duration::from_secs(5), relay_task)
            .await
            .expect("relay did not finish")
            .unwrap();
        assert_eq!(outcome.first, Direction::ClientToUpstream);
        assert_eq!(outcome.result.unwrap(), request.len() as u64);

        // Upstream end was released
        let mut rest = Vec::new();
        upstream_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_close_releases_client() {
        let (mut client_peer, client_side) = duplex(64);
        let (upstream_side, mut upstream_peer) = duplex(64);
        let relay_task = tokio::spawn(relay(client_side, upstream_side));

        upstream_peer.write_all(b"bye").await.unwrap();
        drop(upstream_peer);

        let outcome = timeout(Duration::from_secs(5), relay_task)
            .await
            .expect("relay did not finish")
            .unwrap();
        assert_eq!(outcome.first, Direction::UpstreamToClient);
        assert!(outcome.is_clean());

        let mut received = Vec::new();
        client_peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye");

        // Client end was dropped along with the relay
        assert!(client_peer.write_all(b"late").await.is_err());
    }

    #[tokio::test]
    async fn test_half_close_tears_down_both_directions() {
        let (mut client_peer, client_side) = duplex(64);
        let (upstream_side, mut upstream_peer) = duplex(64);
        let relay_task = tokio::spawn(relay(client_side, upstream_side));

        client_peer.write_all(b"request").await.unwrap();
        client_peer.shutdown().await.unwrap();

        let mut received = Vec::new();
        upstream_peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"request");

        let outcome = timeout(Duration::from_secs(5), relay_task)
            .await
            .expect("relay did not finish")
            .unwrap();
        assert_eq!(outcome.first, Direction::ClientToUpstream);
        assert_eq!(outcome.result.unwrap(), 7);

        // The reply arrives after teardown and never reaches the client
        let _ = upstream_peer.write_all(b"reply").await;
        let mut reply = Vec::new();
        client_peer.read_to_end(&mut reply).await.unwrap();
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn test_read_error_finishes_relay() {
        let (upstream_side, mut upstream_peer) = duplex(64);

        let outcome = timeout(Duration::from_secs(5), relay(BrokenStream, upstream_side))
            .await
            .expect("relay did not finish");
        assert_eq!(outcome.first, Direction::ClientToUpstream);
        match outcome.into_result() {
            Err(ProxyError::Relay(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected relay error, got {:?}", other),
        }

        let mut rest = Vec::new();
        upstream_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
