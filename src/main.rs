//! qedis-proxy - expose a TCP or Unix socket service over QUIC
//!
//! Every bidirectional QUIC stream opened by a client is bridged to its own upstream
//! connection.

use anyhow::{Context, Result};
use clap::Parser;
use qedis_relay::{IdentitySource, ProxyConfig, ProxyServer, Upstream, UpstreamKind};
use qedis_transport_quic::{DEFAULT_IDLE_TIMEOUT, DEFAULT_KEEP_ALIVE, DEFAULT_MAX_STREAMS};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// qedis-proxy - Relay QUIC streams to a TCP or Unix socket upstream
#[derive(Parser, Debug)]
#[command(name = "qedis-proxy")]
#[command(about = "Relay QUIC streams to a TCP or Unix socket upstream")]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), " (", env!("GIT_HASH"), ", built ", env!("BUILD_TIME"), ")"))]
#[command(long_about = r#"
Accept QUIC connections and relay every bidirectional stream to a fixed
upstream over TCP or a Unix domain socket. Each stream gets its own
upstream connection; bytes are copied unchanged in both directions.

EXAMPLES:
  # Expose a local Redis over QUIC with an ephemeral certificate
  qedis-proxy --listen-addr 0.0.0.0:6380 --remote-addr 127.0.0.1:6379

  # Relay to a Unix socket using certificates from disk
  qedis-proxy -l 0.0.0.0:6380 -u unix -r /var/run/redis.sock \
    --cert proxy.crt --key proxy.key

ENVIRONMENT VARIABLES:
  QEDIS_LISTEN_ADDR   UDP address to accept QUIC connections on
  QEDIS_REMOTE_ADDR   Upstream host:port or socket path
  QEDIS_REMOTE_PROTO  Upstream protocol (tcp or unix)
  QEDIS_CERT          PEM certificate chain
  QEDIS_KEY           PEM private key
  RUST_LOG            Log filter, overrides --log-level
"#)]
struct Cli {
    /// UDP address to listen on for QUIC connections
    #[arg(short = 'l', long, env = "QEDIS_LISTEN_ADDR", default_value = "127.0.0.1:6379")]
    listen_addr: String,

    /// Upstream address (host:port for tcp, socket path for unix)
    #[arg(short = 'r', long, env = "QEDIS_REMOTE_ADDR", default_value = "127.0.0.1:6379")]
    remote_addr: String,

    /// Upstream protocol: tcp or unix
    #[arg(short = 'u', long, env = "QEDIS_REMOTE_PROTO", default_value = "tcp")]
    remote_proto: String,

    /// PEM certificate chain (an ephemeral self-signed certificate is used if omitted)
    #[arg(long, env = "QEDIS_CERT", requires = "key")]
    cert: Option<PathBuf>,

    /// PEM private key
    #[arg(long, env = "QEDIS_KEY", requires = "cert")]
    key: Option<PathBuf>,

    /// Extra DNS name or IP for the self-signed certificate (repeatable)
    #[arg(long = "san", conflicts_with = "cert")]
    subject_alt_names: Vec<String>,

    /// ALPN protocol to accept (repeatable; any protocol is accepted if omitted)
    #[arg(long)]
    alpn: Vec<String>,

    /// Keep-alive interval in seconds
    #[arg(long, default_value_t = DEFAULT_KEEP_ALIVE.as_secs())]
    keep_alive: u64,

    /// Idle timeout in seconds
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT.as_secs())]
    idle_timeout: u64,

    /// Maximum concurrent streams per connection
    #[arg(long, default_value_t = DEFAULT_MAX_STREAMS)]
    max_streams: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> Result<ProxyConfig> {
        let kind: UpstreamKind = self.remote_proto.parse()?;

        let identity = match IdentitySource::from_paths(self.cert, self.key)? {
            IdentitySource::SelfSigned { .. } => IdentitySource::SelfSigned {
                extra_names: self.subject_alt_names,
            },
            pem => pem,
        };

        Ok(ProxyConfig {
            listen_addr: self.listen_addr,
            upstream: Upstream::new(kind, self.remote_addr),
            identity,
            alpn_protocols: self.alpn,
            keep_alive_interval: Duration::from_secs(self.keep_alive),
            max_idle_timeout: Duration::from_secs(self.idle_timeout),
            max_concurrent_streams: self.max_streams,
        })
    }
}

/// Setup logging; RUST_LOG takes precedence over `log_level`
fn setup_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let config = cli.into_config().context("Invalid configuration")?;

    let server = ProxyServer::bind(&config)
        .await
        .context("Failed to start proxy")?;

    server
        .serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("Proxy stopped")?;

    info!("Shutting down");
    Ok(())
}
