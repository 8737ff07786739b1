//! Per-connection lifecycle
//!
//! ```text
//! Accepted -> Handshaking -> Established -> Exchanging -> Closed
//!     \______________\______________\_____________/
//!                      any failure
//! ```
//!
//! An [`Accepted`] socket becomes a [`Connection`] only through a successful
//! handshake. Both own a tracker whose drop marks the connection closed, so
//! every accepted socket is counted closed exactly once whichever path it
//! leaves by.

use super::exchange::{self, Exchange, ExchangeOutcome, Progress, Want};
use super::observer::ExchangeObserver;
use super::stats::ServerStats;
use crate::net::Endpoint;
use crate::tls::{handshake, CertInfo, TlsContext, TlsError, TlsSession};
use std::io;
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnState {
    Accepted,
    Handshaking,
    Established,
    Exchanging,
    Closed,
}

/// Errors confined to one connection
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("TLS handshake failed: {0}")]
    Handshake(#[from] TlsError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Deadline expired waiting to {0:?}")]
    Timeout(Want),
}

struct Tracker {
    id: u64,
    endpoint: Endpoint,
    state: ConnState,
    stats: Arc<ServerStats>,
}

impl Tracker {
    fn advance(&mut self, next: ConnState) {
        debug_assert!(next > self.state, "{:?} -> {:?}", self.state, next);
        tracing::trace!(id = self.id, from = ?self.state, to = ?next, "Connection state");
        self.state = next;
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        let from = self.state;
        self.state = ConnState::Closed;
        self.stats.record_closed();
        tracing::debug!(id = self.id, endpoint = %self.endpoint, ?from, "Closed connection");
    }
}

/// TCP connection accepted but not yet secured
pub struct Accepted {
    tracker: Tracker,
    stream: TcpStream,
}

impl Accepted {
    pub fn new(stream: TcpStream, endpoint: Endpoint, stats: Arc<ServerStats>) -> Self {
        stats.record_accepted();
        let id = stats.next_id();
        tracing::debug!(id, %endpoint, "Accepted TCP connection");
        Accepted {
            tracker: Tracker {
                id,
                endpoint,
                state: ConnState::Accepted,
                stats,
            },
            stream,
        }
    }

    pub fn id(&self) -> u64 {
        self.tracker.id
    }

    pub fn endpoint(&self) -> Endpoint {
        self.tracker.endpoint
    }

    /// Run the blocking TLS handshake, bounded by `deadline` when set
    ///
    /// On failure the socket is closed and the error logged; the caller only
    /// learns the error for its own bookkeeping.
    pub fn handshake(
        self,
        ctx: &TlsContext,
        deadline: Option<Duration>,
    ) -> Result<Connection, TlsError> {
        let Accepted {
            mut tracker,
            stream,
        } = self;
        tracker.advance(ConnState::Handshaking);

        let session = handshake::set_deadline(&stream, deadline)
            .map_err(TlsError::from)
            .and_then(|()| ctx.accept(stream));

        match session {
            Ok(session) => {
                tracker.advance(ConnState::Established);
                tracker.stats.record_established();
                log_established(&tracker, &session);
                Ok(Connection {
                    exchange: Exchange::new(tracker.endpoint),
                    tracker,
                    session,
                    deadline: None,
                })
            }
            Err(err) => {
                tracker.stats.record_handshake_failure();
                tracing::warn!(
                    id = tracker.id,
                    endpoint = %tracker.endpoint,
                    error = %err,
                    "TLS handshake failed"
                );
                Err(err)
            }
        }
    }
}

/// Established TLS connection owned by one dispatcher entry or worker
pub struct Connection {
    tracker: Tracker,
    session: TlsSession,
    exchange: Exchange,
    deadline: Option<Instant>,
}

impl Connection {
    pub fn id(&self) -> u64 {
        self.tracker.id
    }

    pub fn endpoint(&self) -> Endpoint {
        self.tracker.endpoint
    }

    pub fn state(&self) -> ConnState {
        self.tracker.state
    }

    pub fn peer_certificate(&self) -> Option<&CertInfo> {
        self.session.info().peer_certificate()
    }

    /// Switch to non-blocking I/O for readiness-driven dispatch
    pub fn set_nonblocking(&self) -> io::Result<()> {
        self.session.set_nonblocking(true)
    }

    /// Start the exchange deadline clock
    pub fn arm_deadline(&mut self, timeout: Option<Duration>, now: Instant) {
        self.deadline = timeout.map(|t| now + t);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the TLS layer holds decrypted bytes no readiness event will
    /// announce
    pub fn has_buffered_input(&self) -> bool {
        self.session.has_pending()
    }

    /// Drive the exchange as far as the socket allows
    pub fn advance(
        &mut self,
        observer: &dyn ExchangeObserver,
    ) -> Result<Progress, ConnectionError> {
        if self.tracker.state == ConnState::Established {
            self.tracker.advance(ConnState::Exchanging);
        }
        self.exchange.advance(&mut self.session, observer)
    }

    /// Run the whole exchange on the blocking socket
    pub fn run_blocking(
        &mut self,
        observer: &dyn ExchangeObserver,
    ) -> Result<ExchangeOutcome, ConnectionError> {
        self.tracker.advance(ConnState::Exchanging);
        exchange::run(&mut self.session, self.tracker.endpoint, observer)
    }

    /// Close the connection, reporting how its exchange ended
    pub fn close(mut self, result: Result<ExchangeOutcome, ConnectionError>) {
        let id = self.tracker.id;
        let endpoint = self.tracker.endpoint;

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    id,
                    %endpoint,
                    identity = outcome.identity.as_deref().unwrap_or("<none>"),
                    reply = %outcome.reply,
                    "Exchange complete"
                );
            }
            Err(err) => {
                tracing::warn!(id, %endpoint, error = %err, "Exchange failed");
            }
        }
        self.tracker.stats.record_exchange(result.is_ok());

        if let Err(e) = self.session.close() {
            tracing::debug!(id, %endpoint, error = %e, "Socket shutdown failed");
        }
        // Dropping self releases the descriptor and records the close.
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.session.as_raw_fd()
    }
}

fn log_established(tracker: &Tracker, session: &TlsSession) {
    let info = session.info();
    match info.peer_certificate() {
        Some(cert) => tracing::info!(
            id = tracker.id,
            endpoint = %tracker.endpoint,
            version = %info.version,
            cipher = %info.cipher,
            peer = %cert,
            "Accepted TLS connection"
        ),
        None => tracing::info!(
            id = tracker.id,
            endpoint = %tracker.endpoint,
            version = %info.version,
            cipher = %info.cipher,
            "Accepted TLS connection"
        ),
    }
}
