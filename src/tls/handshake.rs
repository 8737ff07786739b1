//! TLS handshake helpers
//!
//! The handshake itself is performed by `Ssl::accept()` and `Ssl::connect()`
//! on a blocking socket. This module bounds it in time and turns OpenSSL's
//! handshake outcome into a [`TlsError`].

use super::TlsError;
use openssl::ssl::{HandshakeError, MidHandshakeSslStream};
use openssl::x509::X509VerifyResult;
use std::net::TcpStream;
use std::time::Duration;

/// Default handshake timeout
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Default handshake timeout as a `Duration`
pub fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS)
}

/// Bound blocking reads and writes on `stream`
///
/// A blocking handshake on a socket with a timeout surfaces the expiry as
/// `HandshakeError::WouldBlock`, which [`classify`] maps to
/// [`TlsError::HandshakeTimeout`].
pub fn set_deadline(stream: &TcpStream, timeout: Option<Duration>) -> std::io::Result<()> {
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)
}

/// Map a failed handshake to a per-connection error
pub fn classify(err: HandshakeError<TcpStream>) -> TlsError {
    match err {
        HandshakeError::SetupFailure(stack) => TlsError::OpenSsl(stack),
        HandshakeError::Failure(mid) => TlsError::HandshakeFailed(describe(&mid)),
        HandshakeError::WouldBlock(_) => TlsError::HandshakeTimeout,
    }
}

fn describe(mid: &MidHandshakeSslStream<TcpStream>) -> String {
    let verify = mid.ssl().verify_result();
    if verify != X509VerifyResult::OK {
        return format!("certificate verify failed: {}", verify.error_string());
    }
    match mid.error().io_error() {
        Some(io) => format!("{}: {}", mid.error(), io),
        None => mid.error().to_string(),
    }
}
