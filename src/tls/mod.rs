//! TLS support for the rendezvous server and client
//!
//! This module turns a [`TrustConfig`] into OpenSSL contexts and wraps
//! established connections.
//!
//! # Architecture
//!
//! 1. `TrustConfig` describes which certificate material authenticates each side
//! 2. `TlsContextBuilder` builds a server or client `TlsContext` from it
//! 3. `TlsSession` performs the handshake and carries the encrypted stream
//!
//! The authentication mode is never branched on outside of `context`: the four
//! deployment modes (server-only or mutual, CA-signed or self-signed server)
//! are four `TrustConfig` values sharing one builder.
//!
//! # Examples
//!
//! ## Server requiring client certificates
//!
//! ```no_run
//! use tls_rendezvous::tls::{TlsContextBuilder, TrustConfig};
//!
//! let cfg = TrustConfig::server("0.0.0.0", 30046, "server.pem", "server.key")
//!     .require_peer_cert("clients.pem");
//! let ctx = TlsContextBuilder::build_server_context(&cfg).unwrap();
//! ```
//!
//! ## Client pinning a self-signed server certificate
//!
//! ```no_run
//! use tls_rendezvous::tls::{TlsContextBuilder, TrustConfig};
//!
//! let cfg = TrustConfig::client("rendezvous.example.org", 30046)
//!     .trust_anchor("server.pem")
//!     .identity("client-1.pem", "client-1.key");
//! let ctx = TlsContextBuilder::build_client_context(&cfg).unwrap();
//! ```

pub mod cert;
pub mod config;
pub mod context;
pub mod handshake;
pub mod info;
pub mod session;

#[cfg(test)]
#[path = "../../tests/common/pki.rs"]
pub(crate) mod test_pki;

pub use cert::CertInfo;
pub use config::{AuthMode, ServerTrust, TlsVersion, TrustConfig};
pub use context::{Role, TlsContext, TlsContextBuilder};
pub use info::SessionInfo;
pub use session::TlsSession;

use std::path::PathBuf;

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TLS version: {0}")]
    InvalidVersion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load {}: {reason}", path.display())]
    CertificateLoad { path: PathBuf, reason: String },

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Handshake timed out")]
    HandshakeTimeout,
}

impl TlsError {
    /// Whether the error belongs to a single connection rather than to the
    /// process configuration
    pub fn is_per_connection(&self) -> bool {
        matches!(
            self,
            TlsError::HandshakeFailed(_) | TlsError::HandshakeTimeout | TlsError::Io(_)
        )
    }
}

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
