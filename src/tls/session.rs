//! Established TLS sessions
//!
//! A [`TlsSession`] wraps an OpenSSL `SslStream` over a TCP socket once the
//! handshake has completed. The handshake always runs in blocking mode; the
//! server may switch the socket to non-blocking afterwards.

use super::context::{client_ssl, TlsContext};
use super::handshake;
use super::info::SessionInfo;
use super::Result;
use openssl::ssl::{Ssl, SslStream};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsRawFd, RawFd};

/// TLS session over a TCP stream
pub struct TlsSession {
    stream: SslStream<TcpStream>,
    info: SessionInfo,
    failed: bool,
}

impl TlsSession {
    /// Create a client TLS connection (perform handshake)
    pub fn connect(tcp_stream: TcpStream, ctx: &TlsContext) -> Result<Self> {
        let ssl = client_ssl(ctx)?;

        let ssl_stream = ssl.connect(tcp_stream).map_err(handshake::classify)?;
        let info = SessionInfo::from_ssl(ssl_stream.ssl());

        Ok(TlsSession {
            stream: ssl_stream,
            info,
            failed: false,
        })
    }

    /// Accept a client connection with TLS (perform handshake)
    pub fn accept(tcp_stream: TcpStream, ctx: &TlsContext) -> Result<Self> {
        let ssl = Ssl::new(&ctx.ctx)?;

        let ssl_stream = ssl.accept(tcp_stream).map_err(handshake::classify)?;
        let info = SessionInfo::from_ssl(ssl_stream.ssl());

        Ok(TlsSession {
            stream: ssl_stream,
            info,
            failed: false,
        })
    }

    /// Parameters negotiated during the handshake
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Check if an I/O operation failed
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Switch the underlying socket between blocking and non-blocking I/O
    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.stream.get_ref().set_nonblocking(nonblocking)
    }

    /// Whether decrypted application data is already buffered
    pub fn has_pending(&self) -> bool {
        self.stream.ssl().pending() > 0
    }

    /// Send close_notify (unless the session failed) and shut the socket down
    pub fn close(&mut self) -> io::Result<()> {
        if !self.failed {
            let _ = self.stream.shutdown();
        }

        match self.stream.get_mut().shutdown(Shutdown::Both) {
            // The peer may already be gone.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    fn note(&mut self, err: &io::Error) {
        if !matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
        ) {
            self.failed = true;
        }
    }
}

impl Read for TlsSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).inspect_err(|e| self.note(e))
    }
}

impl Write for TlsSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf).inspect_err(|e| self.note(e))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush().inspect_err(|e| self.note(e))
    }
}

impl AsRawFd for TlsSession {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.get_ref().as_raw_fd()
    }
}
