//! Multiplexed dispatcher
//!
//! One thread, one `mio::Poll`. The listener, the shutdown pipe and every
//! established connection are registered with the poll; the loop blocks only
//! there. Accept and the TLS handshake run synchronously when the listener is
//! ready; after that a connection's socket is non-blocking and its exchange
//! advances one readiness notification at a time.
//!
//! Registrations are edge-triggered, so the listener is drained until
//! `WouldBlock` on every event. When accept fails for another reason (for
//! example EMFILE) the drain is retried after [`ACCEPT_RETRY`], since no new
//! edge may ever arrive for the connections left in the backlog.

use super::connection::{Accepted, Connection, ConnectionError};
use super::exchange::{ExchangeOutcome, Progress, Want};
use super::shutdown::Shutdown;
use super::Shared;
use crate::net::{Endpoint, Listener};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io;
use std::net::TcpStream;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};

const LISTENER: Token = Token(0);
const SHUTDOWN: Token = Token(1);
const FIRST_CONNECTION: usize = 2;

const EVENTS_CAPACITY: usize = 256;

/// Delay before draining the listener again after a failed accept
pub(crate) const ACCEPT_RETRY: Duration = Duration::from_millis(100);

/// What a token refers to
enum Registered {
    Listening(Listener),
    Established { conn: Connection, waiting: Want },
}

/// Readiness loop over a listener and its connections
pub(crate) struct Dispatcher {
    poll: Poll,
    entries: HashMap<Token, Registered>,
    next_token: usize,
    shared: Arc<Shared>,
    retry_accept_at: Option<Instant>,
}

impl Dispatcher {
    pub(crate) fn new(
        listener: Listener,
        shutdown: &Shutdown,
        shared: Arc<Shared>,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;

        listener.set_nonblocking(true)?;
        poll.registry()
            .register(&mut SourceFd(&listener.as_raw_fd()), LISTENER, Interest::READABLE)?;
        poll.registry()
            .register(&mut SourceFd(&shutdown.as_raw_fd()), SHUTDOWN, Interest::READABLE)?;

        let mut entries = HashMap::new();
        entries.insert(LISTENER, Registered::Listening(listener));

        Ok(Dispatcher {
            poll,
            entries,
            next_token: FIRST_CONNECTION,
            shared,
            retry_accept_at: None,
        })
    }

    /// Serve until shutdown is triggered and every connection has finished
    pub(crate) fn run(mut self, shutdown: &Shutdown) -> io::Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        loop {
            if shutdown.is_triggered() {
                self.stop_accepting();
            }
            // The listener is only removed on shutdown.
            if self.entries.is_empty() {
                break;
            }

            let timeout = self.next_timeout(Instant::now());
            match self.poll.poll(&mut events, timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            for event in events.iter() {
                match event.token() {
                    SHUTDOWN => shutdown.drain(),
                    token => self.dispatch(token),
                }
            }

            let now = Instant::now();
            if self.retry_accept_at.is_some_and(|at| at <= now) {
                self.dispatch(LISTENER);
            }
            self.expire_deadlines(now);
        }

        tracing::info!("Dispatcher drained");
        Ok(())
    }

    fn dispatch(&mut self, token: Token) {
        // Events for entries retired earlier in the same batch are stale.
        let Some(entry) = self.entries.remove(&token) else {
            return;
        };

        match entry {
            Registered::Listening(listener) => {
                self.retry_accept_at = match self.accept_all(&listener) {
                    Ok(()) => None,
                    Err(()) => Some(Instant::now() + ACCEPT_RETRY),
                };
                self.entries.insert(token, Registered::Listening(listener));
            }
            Registered::Established { conn, .. } => self.drive(token, conn),
        }
    }

    /// Accept until `WouldBlock`; `Err` when the backlog may still hold
    /// connections
    fn accept_all(&mut self, listener: &Listener) -> Result<(), ()> {
        loop {
            match listener.accept() {
                Ok((stream, endpoint)) => self.establish(stream, endpoint),
                Err(e) => match e.kind() {
                    io::ErrorKind::WouldBlock => return Ok(()),
                    io::ErrorKind::Interrupted
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionReset => {
                        tracing::debug!(error = %e, "Transient accept error");
                        continue;
                    }
                    _ => {
                        tracing::error!(
                            error = %e,
                            address = %listener.local_addr(),
                            retry_in = ?ACCEPT_RETRY,
                            "Error accepting connection"
                        );
                        return Err(());
                    }
                },
            }
        }
    }

    fn establish(&mut self, stream: TcpStream, endpoint: Endpoint) {
        let accepted = Accepted::new(stream, endpoint, self.shared.stats.clone());

        // Failures were logged by the handshake; the socket is closed.
        let Ok(mut conn) = accepted.handshake(&self.shared.context, self.shared.deadline) else {
            return;
        };

        if let Err(e) = conn.set_nonblocking() {
            conn.close(Err(e.into()));
            return;
        }
        conn.arm_deadline(self.shared.deadline, Instant::now());

        let token = Token(self.next_token);
        self.next_token += 1;

        if let Err(e) = self.poll.registry().register(
            &mut SourceFd(&conn.as_raw_fd()),
            token,
            Interest::READABLE,
        ) {
            conn.close(Err(e.into()));
            return;
        }

        if conn.has_buffered_input() {
            self.drive(token, conn);
        } else {
            self.entries.insert(
                token,
                Registered::Established {
                    conn,
                    waiting: Want::Read,
                },
            );
        }
    }

    fn drive(&mut self, token: Token, mut conn: Connection) {
        match conn.advance(self.shared.observer.as_ref()) {
            Ok(Progress::Pending(want)) => {
                let interest = match want {
                    Want::Read => Interest::READABLE,
                    Want::Write => Interest::WRITABLE,
                };
                if let Err(e) = self.poll.registry().reregister(
                    &mut SourceFd(&conn.as_raw_fd()),
                    token,
                    interest,
                ) {
                    self.retire(conn, Err(e.into()));
                    return;
                }
                tracing::trace!(id = conn.id(), ?want, "Exchange pending");
                self.entries
                    .insert(token, Registered::Established { conn, waiting: want });
            }
            Ok(Progress::Complete(outcome)) => self.retire(conn, Ok(outcome)),
            Err(e) => self.retire(conn, Err(e)),
        }
    }

    fn retire(&mut self, conn: Connection, result: Result<ExchangeOutcome, ConnectionError>) {
        if let Err(e) = self
            .poll
            .registry()
            .deregister(&mut SourceFd(&conn.as_raw_fd()))
        {
            tracing::debug!(id = conn.id(), error = %e, "Deregister failed");
        }
        conn.close(result);
    }

    fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.entries
            .values()
            .filter_map(|entry| match entry {
                Registered::Established { conn, .. } => conn.deadline(),
                Registered::Listening(_) => None,
            })
            .chain(self.retry_accept_at)
            .min()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    fn expire_deadlines(&mut self, now: Instant) {
        let expired: Vec<Token> = self
            .entries
            .iter()
            .filter_map(|(token, entry)| match entry {
                Registered::Established { conn, .. }
                    if conn.deadline().is_some_and(|d| d <= now) =>
                {
                    Some(*token)
                }
                _ => None,
            })
            .collect();

        for token in expired {
            if let Some(Registered::Established { conn, waiting }) = self.entries.remove(&token) {
                self.retire(conn, Err(ConnectionError::Timeout(waiting)));
            }
        }
    }

    fn stop_accepting(&mut self) {
        self.retry_accept_at = None;
        let Some(Registered::Listening(listener)) = self.entries.remove(&LISTENER) else {
            return;
        };

        if let Err(e) = self
            .poll
            .registry()
            .deregister(&mut SourceFd(&listener.as_raw_fd()))
        {
            tracing::debug!(error = %e, "Deregister listener failed");
        }
        tracing::info!(
            address = %listener.local_addr(),
            in_flight = self.entries.len(),
            "Stopped accepting"
        );
    }
}
