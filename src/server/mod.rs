//! Rendezvous server
//!
//! A [`Server`] owns the listening socket and the server TLS context. Each
//! accepted connection is secured, asked for the peer's hostname, answered
//! with the peer's observed address, and closed.
//!
//! Two dispatch strategies share that per-connection protocol:
//!
//! - [`Strategy::Multiplexed`]: one thread with a readiness loop (`mio`).
//! - [`Strategy::ThreadPerConnection`]: one blocking worker per connection.
//!
//! # Example
//!
//! ```no_run
//! use tls_rendezvous::server::{Server, ServerOptions};
//! use tls_rendezvous::tls::TrustConfig;
//!
//! let cfg = TrustConfig::server("0.0.0.0", 30046, "server.crt", "server.key")
//!     .require_peer_cert("clients.crt");
//! let server = Server::bind(&cfg, ServerOptions::default()).unwrap();
//! server.run().unwrap();
//! ```

pub mod connection;
mod dispatcher;
pub mod exchange;
pub mod observer;
pub mod shutdown;
pub mod stats;
mod threaded;

pub use connection::{ConnState, Connection, ConnectionError};
pub use exchange::{ExchangeOutcome, ADDR6_LEN_MAX, ADDR_LEN_MAX, NAME_LEN_MAX};
pub use observer::{ExchangeObserver, ExchangeRecord, LogObserver, RecordingObserver};
pub use shutdown::{install_interrupt_handler, Shutdown, ShutdownHandle};
pub use stats::{ServerStats, StatsSnapshot};

use crate::net::{self, Listener};
use crate::tls::{handshake, TlsContext, TlsContextBuilder, TlsError, TrustConfig};
use serde::Deserialize;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Net(#[from] net::Error),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for server operations
pub type Result<T> = std::result::Result<T, Error>;

/// How accepted connections are driven
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    Multiplexed,
    #[serde(alias = "threaded")]
    ThreadPerConnection,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Multiplexed => "multiplexed",
            Strategy::ThreadPerConnection => "thread-per-connection",
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "multiplexed" | "mux" => Ok(Strategy::Multiplexed),
            "thread-per-connection" | "threaded" => Ok(Strategy::ThreadPerConnection),
            _ => Err(format!("Unknown strategy: {}", s)),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime options that are not part of the trust configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    pub strategy: Strategy,
    /// Bound on the handshake and on the exchange of each connection;
    /// `None` waits indefinitely.
    pub deadline: Option<Duration>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            strategy: Strategy::default(),
            deadline: Some(handshake::default_timeout()),
        }
    }
}

impl ServerOptions {
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Read-only state every connection needs
pub(crate) struct Shared {
    pub(crate) context: TlsContext,
    pub(crate) deadline: Option<Duration>,
    pub(crate) observer: Arc<dyn ExchangeObserver>,
    pub(crate) stats: Arc<ServerStats>,
}

/// Bound rendezvous server, ready to run
pub struct Server {
    listener: Listener,
    context: TlsContext,
    options: ServerOptions,
    observer: Arc<dyn ExchangeObserver>,
    stats: Arc<ServerStats>,
    shutdown: Shutdown,
}

impl Server {
    /// Build the TLS context and bind the listener
    ///
    /// Certificate problems are reported before any socket is bound.
    pub fn bind(cfg: &TrustConfig, options: ServerOptions) -> Result<Self> {
        let context = TlsContextBuilder::build_server_context(cfg)?;
        let listener = Listener::bind(cfg)?;
        let shutdown = Shutdown::new()?;

        Ok(Server {
            listener,
            context,
            options,
            observer: Arc::new(LogObserver),
            stats: Arc::new(ServerStats::new()),
            shutdown,
        })
    }

    /// Replace the default logging observer
    pub fn with_observer(mut self, observer: Arc<dyn ExchangeObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Handle that stops [`run`](Self::run) from another thread or a signal
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.handle()
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        self.stats.clone()
    }

    /// Serve until shutdown, then let in-flight connections finish
    pub fn run(self) -> Result<()> {
        let Server {
            listener,
            context,
            options,
            observer,
            stats,
            shutdown,
        } = self;

        tracing::info!(
            address = %listener.local_addr(),
            strategy = %options.strategy,
            auth = ?context.auth_mode(),
            deadline = ?options.deadline,
            "Server started"
        );

        let shared = Arc::new(Shared {
            context,
            deadline: options.deadline,
            observer,
            stats: stats.clone(),
        });

        match options.strategy {
            Strategy::Multiplexed => {
                dispatcher::Dispatcher::new(listener, &shutdown, shared)?.run(&shutdown)?
            }
            Strategy::ThreadPerConnection => threaded::run(listener, &shutdown, shared)?,
        }

        let snap = stats.snapshot();
        tracing::info!(
            accepted = snap.accepted,
            handshake_failures = snap.handshake_failures,
            exchanges = snap.exchanges,
            exchange_failures = snap.exchange_failures,
            "Server stopped"
        );
        Ok(())
    }
}
