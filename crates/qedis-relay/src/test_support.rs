//! In-memory transport mocks for session and server tests

use async_trait::async_trait;
use qedis_transport::{
    TransportConnection, TransportError, TransportListener, TransportResult, TransportStream,
};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{duplex, AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, Layer};
use tracing_subscriber::prelude::*;

/// Logical stream backed by an in-memory pipe
#[derive(Debug)]
pub struct MockStream {
    id: u64,
    inner: DuplexStream,
}

impl TransportStream for MockStream {
    fn stream_id(&self) -> u64 {
        self.id
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// A logical stream and the front-end peer's end of it
pub fn mock_stream(id: u64) -> (MockStream, DuplexStream) {
    let (inner, peer) = duplex(1024);
    (MockStream { id, inner }, peer)
}

/// Connection that yields a scripted sequence of `accept_stream` results
///
/// Once the script runs out it behaves like a gracefully closed connection.
#[derive(Debug)]
pub struct MockConnection {
    id: u64,
    script: Mutex<VecDeque<TransportResult<Option<MockStream>>>>,
    closed: AtomicBool,
}

impl MockConnection {
    pub fn new(id: u64, script: Vec<TransportResult<Option<MockStream>>>) -> Self {
        Self {
            id,
            script: Mutex::new(script.into()),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TransportConnection for MockConnection {
    type Stream = MockStream;

    async fn open_stream(&self) -> TransportResult<Self::Stream> {
        Err(TransportError::ConnectionError(
            "mock connections only accept streams".to_string(),
        ))
    }

    async fn accept_stream(&self) -> TransportResult<Option<Self::Stream>> {
        match self.script.lock().await.pop_front() {
            Some(next) => next,
            None => {
                self.closed.store(true, Ordering::SeqCst);
                Ok(None)
            }
        }
    }

    async fn close(&self, _error_code: u32, _reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn remote_address(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000 + self.id as u16))
    }

    fn connection_id(&self) -> String {
        format!("mock-{}", self.id)
    }
}

/// Listener that yields a scripted sequence of `accept` results, then reports closure
#[derive(Debug)]
pub struct MockListener {
    script: Mutex<VecDeque<TransportResult<MockConnection>>>,
    closed: AtomicBool,
    addr_unavailable: bool,
}

impl MockListener {
    pub fn new(script: Vec<TransportResult<MockConnection>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            closed: AtomicBool::new(false),
            addr_unavailable: false,
        }
    }

    /// A listener whose socket address cannot be queried
    pub fn without_local_addr() -> Self {
        Self {
            addr_unavailable: true,
            ..Self::idle()
        }
    }

    /// A listener that never yields anything until closed
    pub fn idle() -> Self {
        Self::new(Vec::new())
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportListener for MockListener {
    type Connection = MockConnection;

    async fn accept(&self) -> TransportResult<(Self::Connection, SocketAddr)> {
        let next = self.script.lock().await.pop_front();
        match next {
            Some(Ok(conn)) => {
                let remote = conn.remote_address();
                Ok((conn, remote))
            }
            Some(Err(e)) => Err(e),
            None if self.closed.load(Ordering::SeqCst) => Err(TransportError::EndpointClosed),
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        if self.addr_unavailable {
            return Err(TransportError::IoError(io::ErrorKind::AddrNotAvailable.into()));
        }
        Ok(SocketAddr::from(([127, 0, 0, 1], 6379)))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// TCP echo upstream; returns its address and a receiver notified whenever a proxied
/// connection is closed by the proxy side
pub async fn echo_upstream() -> (String, tokio::sync::mpsc::UnboundedReceiver<()>) {
    use tokio::io::AsyncWriteExt;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (closed_tx, closed_rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((conn, _)) = listener.accept().await {
            let closed_tx = closed_tx.clone();
            tokio::spawn(async move {
                let (mut read, mut write) = conn.into_split();
                let _ = tokio::io::copy(&mut read, &mut write).await;
                let _ = write.shutdown().await;
                let _ = closed_tx.send(());
            });
        }
    });

    (addr, closed_rx)
}

/// Layer counting ERROR-level events
#[derive(Clone, Default)]
pub struct ErrorCounter {
    count: Arc<AtomicUsize>,
}

impl ErrorCounter {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// A subscriber that reports every event to this counter
    pub fn subscriber(&self) -> impl Subscriber + Send + Sync + 'static {
        tracing_subscriber::registry().with(self.clone())
    }
}

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}
