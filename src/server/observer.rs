//! Audit hook for peer-asserted identities

use crate::net::Endpoint;
use std::sync::Mutex;

/// Hostname a peer sent, next to the address the transport observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRecord {
    pub endpoint: Endpoint,
    /// Decoded as UTF-8; invalid sequences are replaced
    pub identity: String,
    /// Raw bytes received
    pub len: usize,
    /// The read filled the whole name bound, so the name may have been cut
    pub at_bound: bool,
}

/// Receives every non-empty identity read by the exchange
///
/// Called on the dispatcher thread (multiplexed) or a worker thread
/// (thread-per-connection), so it must not block for long.
pub trait ExchangeObserver: Send + Sync {
    fn on_identity(&self, record: &ExchangeRecord);
}

/// Logs each identity at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ExchangeObserver for LogObserver {
    fn on_identity(&self, record: &ExchangeRecord) {
        if record.at_bound {
            tracing::warn!(
                endpoint = %record.endpoint,
                len = record.len,
                "Identity fills the name bound and may be truncated"
            );
        }
        tracing::info!(
            identity = %record.identity,
            endpoint = %record.endpoint,
            "Received identity"
        );
    }
}

/// Keeps every record in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    records: Mutex<Vec<ExchangeRecord>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ExchangeRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ExchangeObserver for RecordingObserver {
    fn on_identity(&self, record: &ExchangeRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_recording_observer_keeps_order() {
        let observer = RecordingObserver::new();
        let endpoint = Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000);

        for name in ["alpha.example", "beta.example"] {
            observer.on_identity(&ExchangeRecord {
                endpoint,
                identity: name.to_string(),
                len: name.len(),
                at_bound: false,
            });
        }

        let names: Vec<_> = observer.records().into_iter().map(|r| r.identity).collect();
        assert_eq!(names, vec!["alpha.example", "beta.example"]);
    }
}
