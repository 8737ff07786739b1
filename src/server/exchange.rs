//! One-shot rendezvous exchange
//!
//! The peer sends its hostname in a single write; the server answers with the
//! address it observed for the peer. There is no framing: one read bounded by
//! [`NAME_LEN_MAX`] and one reply are the whole protocol.
//!
//! [`Exchange::advance`] is resumable so that the multiplexed dispatcher can
//! park a connection on `WouldBlock`; [`run`] drives the same state machine on
//! a blocking stream.

use super::connection::ConnectionError;
use super::observer::{ExchangeObserver, ExchangeRecord};
use crate::net::Endpoint;
use std::io::{self, Read, Write};

/// Longest domain name (RFC 1035, textual form without trailing dot)
pub const NAME_LEN_MAX: usize = 253;

/// Longest dotted-quad literal ("255.255.255.255")
pub const ADDR_LEN_MAX: usize = 15;

/// Longest textual IPv6 literal
pub const ADDR6_LEN_MAX: usize = 45;

/// Readiness an unfinished exchange waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Want {
    Read,
    Write,
}

/// Result of driving an exchange once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Pending(Want),
    Complete(ExchangeOutcome),
}

/// What a finished exchange saw and sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOutcome {
    pub endpoint: Endpoint,
    /// `None` when the peer sent nothing before closing
    pub identity: Option<String>,
    pub reply: String,
}

#[derive(Debug)]
enum Phase {
    Receiving,
    Replying { reply: Vec<u8>, written: usize },
    Done,
}

/// Exchange state for one connection
#[derive(Debug)]
pub struct Exchange {
    endpoint: Endpoint,
    identity: Option<String>,
    phase: Phase,
}

impl Exchange {
    pub fn new(endpoint: Endpoint) -> Self {
        Exchange {
            endpoint,
            identity: None,
            phase: Phase::Receiving,
        }
    }

    /// Perform as much of the exchange as the stream allows
    ///
    /// Returns `Pending` when the stream reports `WouldBlock`; calling again
    /// after the matching readiness notification resumes where it stopped.
    pub fn advance<S: Read + Write>(
        &mut self,
        stream: &mut S,
        observer: &dyn ExchangeObserver,
    ) -> Result<Progress, ConnectionError> {
        loop {
            match &mut self.phase {
                Phase::Receiving => {
                    let mut buf = [0u8; NAME_LEN_MAX];
                    let n = match stream.read(&mut buf) {
                        Ok(n) => n,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            return Ok(Progress::Pending(Want::Read))
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(ConnectionError::Io(e)),
                    };

                    if n == 0 {
                        tracing::debug!(endpoint = %self.endpoint, "Peer sent no identity");
                    } else {
                        let record = ExchangeRecord {
                            endpoint: self.endpoint,
                            identity: String::from_utf8_lossy(&buf[..n]).into_owned(),
                            len: n,
                            at_bound: n == NAME_LEN_MAX,
                        };
                        observer.on_identity(&record);
                        self.identity = Some(record.identity);
                    }

                    self.phase = Phase::Replying {
                        reply: self.endpoint.address_literal().into_bytes(),
                        written: 0,
                    };
                }
                Phase::Replying { reply, written } => {
                    match stream.write(&reply[*written..]) {
                        Ok(0) => {
                            return Err(ConnectionError::Io(io::Error::new(
                                io::ErrorKind::WriteZero,
                                "peer stopped accepting the reply",
                            )))
                        }
                        Ok(n) => *written += n,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            return Ok(Progress::Pending(Want::Write))
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(ConnectionError::Io(e)),
                    }

                    if *written == reply.len() {
                        let reply = String::from_utf8_lossy(reply).into_owned();
                        self.phase = Phase::Done;
                        return Ok(Progress::Complete(ExchangeOutcome {
                            endpoint: self.endpoint,
                            identity: self.identity.take(),
                            reply,
                        }));
                    }
                }
                Phase::Done => {
                    return Err(ConnectionError::Io(io::Error::new(
                        io::ErrorKind::Other,
                        "exchange already completed",
                    )))
                }
            }
        }
    }
}

/// Run the exchange on a blocking stream
///
/// A `WouldBlock` from a blocking socket means its read or write timeout
/// expired, reported as [`ConnectionError::Timeout`].
pub fn run<S: Read + Write>(
    stream: &mut S,
    endpoint: Endpoint,
    observer: &dyn ExchangeObserver,
) -> Result<ExchangeOutcome, ConnectionError> {
    let mut exchange = Exchange::new(endpoint);
    match exchange.advance(stream, observer)? {
        Progress::Complete(outcome) => Ok(outcome),
        Progress::Pending(want) => Err(ConnectionError::Timeout(want)),
    }
}
