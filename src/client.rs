//! Rendezvous client
//!
//! Connects to the server, verifies it, sends a hostname and reads back the
//! address the server observed for this client.
//!
//! ```no_run
//! use tls_rendezvous::client::ClientSession;
//! use tls_rendezvous::tls::TrustConfig;
//!
//! let cfg = TrustConfig::client("rendezvous.example.org", 30046)
//!     .identity("client-1.crt", "client-1.key");
//! let mut session = ClientSession::connect(&cfg).unwrap();
//! println!("{}", session.info());
//! let reply = session.exchange("node-7.example.org").unwrap();
//! println!("observed as {}", reply);
//! ```

use crate::net::{self, Endpoint};
use crate::server::exchange::ADDR6_LEN_MAX;
use crate::tls::{handshake, SessionInfo, TlsContextBuilder, TlsError, TlsSession, TrustConfig};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// Client errors
///
/// All of them end the invocation; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Resolve(#[from] net::Error),

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Server closed the connection without a reply")]
    EmptyReply,
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Established, verified session with the server
pub struct ClientSession {
    session: TlsSession,
    server: Endpoint,
}

impl ClientSession {
    /// Connect and complete the TLS handshake
    ///
    /// Each resolved address is tried in order. Connect, handshake and every
    /// later read or write are bounded by the default handshake timeout.
    pub fn connect(cfg: &TrustConfig) -> Result<Self> {
        Self::connect_timeout(cfg, handshake::default_timeout())
    }

    pub fn connect_timeout(cfg: &TrustConfig, timeout: Duration) -> Result<Self> {
        // Certificate problems are reported before touching the network.
        let ctx = TlsContextBuilder::build_client_context(cfg)?;
        let addrs = net::resolve(&cfg.host, cfg.port)?;

        let (stream, addr) = connect_any(&addrs, timeout)?;
        handshake::set_deadline(&stream, Some(timeout))?;
        let session = ctx.connect(stream)?;

        tracing::debug!(server = %addr, info = %session.info(), "Connected");
        Ok(ClientSession {
            session,
            server: Endpoint::from(addr),
        })
    }

    /// Negotiated version, cipher and server certificate chain
    pub fn info(&self) -> &SessionInfo {
        self.session.info()
    }

    pub fn server(&self) -> Endpoint {
        self.server
    }

    /// Send `hostname` in one write and return the server's one reply
    pub fn exchange(&mut self, hostname: &str) -> Result<String> {
        self.session.write_all(hostname.as_bytes())?;
        self.session.flush()?;

        // An IPv4 server answers with at most ADDR_LEN_MAX bytes; the
        // buffer is sized for the longest IPv6 literal.
        let mut buf = [0u8; ADDR6_LEN_MAX];
        let n = loop {
            match self.session.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            return Err(ClientError::EmptyReply);
        }

        Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
    }

    /// Close the session
    pub fn close(mut self) {
        if let Err(e) = self.session.close() {
            tracing::debug!(error = %e, "Socket shutdown failed");
        }
    }
}

/// What one client invocation learned
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub info: SessionInfo,
    pub reply: String,
}

/// Connect, send `hostname`, read the reply and close
pub fn request(cfg: &TrustConfig, hostname: &str) -> Result<SessionReport> {
    let mut session = ClientSession::connect(cfg)?;
    let reply = session.exchange(hostname)?;
    let info = session.info().clone();
    session.close();
    Ok(SessionReport { info, reply })
}

fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> Result<(TcpStream, SocketAddr)> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok((stream, *addr)),
            Err(e) => {
                tracing::debug!(%addr, error = %e, "Connect failed");
                last_err = Some((addr, e));
            }
        }
    }

    // `resolve` never returns an empty list.
    let (addr, source) = last_err.ok_or_else(|| {
        ClientError::Resolve(net::Error::Resolve("no addresses".to_string()))
    })?;
    Err(ClientError::Connect {
        addr: addr.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::test_pki::Pki;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_connection_refused() {
        let pki = Pki::generate();
        // Bind then drop to find a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let cfg = TrustConfig::client("127.0.0.1", port).trust_anchor(&pki.self_signed_server.cert);
        let err = ClientSession::connect(&cfg).err().unwrap();
        assert!(matches!(err, ClientError::Connect { .. }));
    }

    #[test]
    fn test_bad_anchor_fails_before_connect() {
        let pki = Pki::generate();
        let cfg = TrustConfig::client("127.0.0.1", 1).trust_anchor(pki.missing());
        let err = ClientSession::connect(&cfg).err().unwrap();
        assert!(matches!(err, ClientError::Tls(TlsError::CertificateLoad { .. })));
    }

    #[test]
    fn test_unresolvable_host() {
        let cfg = TrustConfig::client("no such host.invalid", 30046);
        let err = ClientSession::connect(&cfg).err().unwrap();
        assert!(matches!(err, ClientError::Resolve(_)));
    }

    #[test]
    fn test_reads_ipv6_literal_reply_whole() {
        let pki = Pki::generate();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server_cfg = TrustConfig::server(
            "127.0.0.1",
            port,
            &pki.self_signed_server.cert,
            &pki.self_signed_server.key,
        );
        let server_ctx = TlsContextBuilder::build_server_context(&server_cfg).unwrap();

        let literal = "ffff:ffff:ffff:ffff:ffff:ffff:255.255.255.255";
        assert_eq!(literal.len(), ADDR6_LEN_MAX);
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut session = server_ctx.accept(stream).unwrap();
            let mut buf = [0u8; 64];
            let n = session.read(&mut buf).unwrap();
            session.write_all(literal.as_bytes()).unwrap();
            let _ = session.close();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        let cfg = TrustConfig::client("127.0.0.1", port).trust_anchor(&pki.self_signed_server.cert);
        let mut session = ClientSession::connect(&cfg).unwrap();
        assert_eq!(session.exchange("v6.example").unwrap(), literal);
        session.close();

        assert_eq!(server.join().unwrap(), "v6.example");
    }
}
