//! Upstream endpoint and dialing
//!
//! Every logical stream gets its own freshly dialed upstream connection. Nothing is pooled.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tracing::trace;

use crate::error::ProxyError;

/// Transport used to reach the upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamKind {
    /// `host:port` over TCP
    Tcp,
    /// Filesystem path of a Unix domain socket
    Unix,
}

impl UpstreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamKind::Tcp => "tcp",
            UpstreamKind::Unix => "unix",
        }
    }
}

impl fmt::Display for UpstreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpstreamKind {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(UpstreamKind::Tcp),
            "unix" => Ok(UpstreamKind::Unix),
            other => Err(ProxyError::Config(format!(
                "Unknown upstream protocol '{}' (expected tcp or unix)",
                other
            ))),
        }
    }
}

/// The fixed upstream every logical stream is relayed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub kind: UpstreamKind,
    pub address: String,
}

impl Upstream {
    pub fn new(kind: UpstreamKind, address: impl Into<String>) -> Self {
        Self {
            kind,
            address: address.into(),
        }
    }

    pub fn tcp(address: impl Into<String>) -> Self {
        Self::new(UpstreamKind::Tcp, address)
    }

    pub fn unix(path: impl Into<String>) -> Self {
        Self::new(UpstreamKind::Unix, path)
    }

    /// Open one new connection to the upstream
    pub async fn dial(&self) -> Result<UpstreamStream, ProxyError> {
        let stream = match self.kind {
            UpstreamKind::Tcp => {
                let stream = TcpStream::connect(&self.address)
                    .await
                    .map_err(|e| self.dial_error(e))?;
                stream.set_nodelay(true).map_err(|e| self.dial_error(e))?;
                UpstreamStream::Tcp(stream)
            }
            #[cfg(unix)]
            UpstreamKind::Unix => UpstreamStream::Unix(
                UnixStream::connect(&self.address)
                    .await
                    .map_err(|e| self.dial_error(e))?,
            ),
            #[cfg(not(unix))]
            UpstreamKind::Unix => {
                return Err(self.dial_error(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "unix sockets are not available on this platform",
                )))
            }
        };

        trace!("Dialed {} upstream {}", self.kind, self.address);
        Ok(stream)
    }

    fn dial_error(&self, source: io::Error) -> ProxyError {
        ProxyError::Dial {
            kind: self.kind,
            address: self.address.clone(),
            source,
        }
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.address)
    }
}

/// A dialed upstream connection
#[derive(Debug)]
pub enum UpstreamStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AsyncRead for UpstreamStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            UpstreamStream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for UpstreamStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            UpstreamStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            UpstreamStream::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            UpstreamStream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            UpstreamStream::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_kind() {
        assert_eq!("tcp".parse::<UpstreamKind>().unwrap(), UpstreamKind::Tcp);
        assert_eq!("UNIX".parse::<UpstreamKind>().unwrap(), UpstreamKind::Unix);
        assert!(matches!(
            "udp".parse::<UpstreamKind>(),
            Err(ProxyError::Config(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Upstream::tcp("127.0.0.1:6379").to_string(), "tcp 127.0.0.1:6379");
    }

    #[tokio::test]
    async fn test_dial_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let upstream = Upstream::tcp(addr.to_string());
        let (dialed, accepted) = tokio::join!(upstream.dial(), listener.accept());
        let mut dialed = dialed.unwrap();
        let (mut accepted, _) = accepted.unwrap();

        dialed.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        accepted.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        match Upstream::tcp(addr.to_string()).dial().await {
            Err(ProxyError::Dial { kind, address, .. }) => {
                assert_eq!(kind, UpstreamKind::Tcp);
                assert_eq!(address, addr.to_string());
            }
            other => panic!("expected dial error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dial_unix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstream.sock");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let upstream = Upstream::unix(path.to_string_lossy());
        let (dialed, accepted) = tokio::join!(upstream.dial(), listener.accept());
        assert!(matches!(dialed.unwrap(), UpstreamStream::Unix(_)));
        assert!(accepted.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dial_missing_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sock");

        let result = Upstream::unix(path.to_string_lossy()).dial().await;
        assert!(matches!(result, Err(ProxyError::Dial { kind: UpstreamKind::Unix, .. })));
    }
}
