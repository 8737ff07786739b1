//! Shared fixtures for the integration tests

#![allow(dead_code)]

pub mod pki;

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tls_rendezvous::server::{
    RecordingObserver, Server, ServerOptions, ServerStats, ShutdownHandle,
};
use tls_rendezvous::tls::TrustConfig;

/// Server running on a background thread
pub struct RunningServer {
    pub addr: SocketAddr,
    pub stats: Arc<ServerStats>,
    pub observer: Arc<RecordingObserver>,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<()>>,
}

impl RunningServer {
    pub fn start(cfg: &TrustConfig, options: ServerOptions) -> Self {
        tls_rendezvous::logging::init_test_logging();

        let observer = Arc::new(RecordingObserver::new());
        let server = Server::bind(cfg, options)
            .expect("bind test server")
            .with_observer(observer.clone());

        let addr = server.local_addr();
        let stats = server.stats();
        let shutdown = server.shutdown_handle();
        let thread = thread::spawn(move || server.run().expect("server run"));

        RunningServer {
            addr,
            stats,
            observer,
            shutdown,
            thread: Some(thread),
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Trigger shutdown and wait until every connection is closed
    pub fn stop(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.shutdown.trigger();
        if let Some(thread) = self.thread.take() {
            thread.join().expect("server thread panicked");
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if self.thread.is_some() && !thread::panicking() {
            self.join();
        }
    }
}

/// Client configuration pointed at `server` on the loopback address
pub fn client_for(server: &RunningServer) -> TrustConfig {
    TrustConfig::client("127.0.0.1", server.port())
}
