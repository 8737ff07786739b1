//! Connection lifecycle counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated as connections move through their lifecycle
///
/// Shared by reference between the dispatcher and its workers; every field is
/// monotonic.
#[derive(Debug, Default)]
pub struct ServerStats {
    next_id: AtomicU64,
    accepted: AtomicU64,
    handshake_failures: AtomicU64,
    established: AtomicU64,
    exchanges: AtomicU64,
    exchange_failures: AtomicU64,
    closed: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub handshake_failures: u64,
    pub established: u64,
    pub exchanges: u64,
    pub exchange_failures: u64,
    pub closed: u64,
}

impl StatsSnapshot {
    /// Connections accepted but not yet closed
    pub fn in_flight(&self) -> u64 {
        self.accepted.saturating_sub(self.closed)
    }
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handshake_failure(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_established(&self) {
        self.established.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_exchange(&self, ok: bool) {
        if ok {
            self.exchanges.fetch_add(1, Ordering::Relaxed);
        } else {
            self.exchange_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    // Release pairs with the Acquire in `snapshot` so a snapshot that sees a
    // close also sees everything recorded before it.
    pub(crate) fn record_closed(&self) {
        self.closed.fetch_add(1, Ordering::Release);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let closed = self.closed.load(Ordering::Acquire);
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            established: self.established.load(Ordering::Relaxed),
            exchanges: self.exchanges.load(Ordering::Relaxed),
            exchange_failures: self.exchange_failures.load(Ordering::Relaxed),
            closed,
        }
    }
}
