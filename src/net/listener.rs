//! Listening socket
//!
//! The socket is created with `socket2` so that address reuse is set before
//! `bind()` and the backlog is explicit.

use super::{resolve, Endpoint, Error, Result};
use crate::tls::TrustConfig;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};

/// Pending-connection queue length passed to `listen()`
pub const BACKLOG: i32 = 100;

/// Bound and listening TCP socket
///
/// Owns the server socket exclusively; dropping it closes the socket.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind `(cfg.host, cfg.port)`, trying each resolved address in turn
    pub fn bind(cfg: &TrustConfig) -> Result<Self> {
        let addrs = resolve(&cfg.host, cfg.port).map_err(|e| Error::Bind {
            addr: format!("{}:{}", cfg.host, cfg.port),
            source: io::Error::new(io::ErrorKind::InvalidInput, e.to_string()),
        })?;

        let mut last_err = None;
        for addr in addrs {
            match Self::bind_addr(addr) {
                Ok(listener) => return Ok(listener),
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Resolve(cfg.host.clone())))
    }

    /// Bind a single socket address
    pub fn bind_addr(addr: SocketAddr) -> Result<Self> {
        let bind_err = |source: io::Error| Error::Bind {
            addr: addr.to_string(),
            source,
        };

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;
        socket.listen(BACKLOG).map_err(bind_err)?;

        let inner: TcpListener = socket.into();
        let local_addr = inner.local_addr()?;

        tracing::info!(address = %local_addr, backlog = BACKLOG, "Listening");

        Ok(Listener { inner, local_addr })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept one raw TCP connection
    ///
    /// The returned stream is always in blocking mode, ready for the TLS
    /// handshake, whatever the mode of the listener.
    pub fn accept(&self) -> io::Result<(TcpStream, Endpoint)> {
        let (stream, addr) = self.inner.accept()?;
        stream.set_nonblocking(false)?;
        Ok((stream, Endpoint::from(addr)))
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.inner.set_nonblocking(nonblocking)
    }
}

impl AsRawFd for Listener {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::thread;

    #[test]
    fn test_bind_and_accept() {
        let cfg = TrustConfig::client("127.0.0.1", 0);
        let listener = Listener::bind(&cfg).unwrap();
        let addr = listener.local_addr();
        assert_ne!(addr.port(), 0);

        let handle = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"ping").unwrap();
        });

        let (mut stream, endpoint) = listener.accept().unwrap();
        assert_eq!(endpoint.address_literal(), "127.0.0.1");

        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        handle.join().unwrap();
    }

    #[test]
    fn test_address_in_use() {
        let first = Listener::bind_addr("127.0.0.1:0".parse().unwrap()).unwrap();
        // SO_REUSEADDR does not allow two listeners on one port.
        let err = Listener::bind_addr(first.local_addr()).unwrap_err();
        assert!(matches!(
            err,
            Error::Bind { ref source, .. } if source.kind() == io::ErrorKind::AddrInUse
        ));
    }

    #[test]
    fn test_unresolvable_host() {
        let cfg = TrustConfig::client("no such host.invalid", 0);
        assert!(matches!(Listener::bind(&cfg), Err(Error::Bind { .. })));
    }

    #[test]
    fn test_accepted_stream_is_blocking() {
        let listener = Listener::bind_addr("127.0.0.1:0".parse().unwrap()).unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr();

        let _client = TcpStream::connect(addr).unwrap();
        let (stream, _) = loop {
            match listener.accept() {
                Ok(pair) => break pair,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::yield_now(),
                Err(e) => panic!("accept failed: {}", e),
            }
        };

        stream
            .set_read_timeout(Some(std::time::Duration::from_millis(50)))
            .unwrap();
        let mut buf = [0u8; 1];
        let start = std::time::Instant::now();
        assert!((&stream).read(&mut buf).is_err());
        // Waited for the timeout rather than failing with EAGAIN at once.
        assert!(start.elapsed() >= std::time::Duration::from_millis(40));
    }
}
