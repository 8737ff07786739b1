//! Negotiated session parameters
//!
//! Populated right after a handshake so that both sides can report what was
//! negotiated: protocol version, cipher, and the peer's certificate chain.

use super::cert::{get_cert_chain, CertInfo};
use openssl::ssl::SslRef;
use std::fmt;

/// TLS parameters available after handshake
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Negotiated TLS version (e.g., "TLSv1.3")
    pub version: String,

    /// Negotiated cipher suite
    pub cipher: String,

    /// Secret bits of the negotiated cipher
    pub cipher_bits: i32,

    /// SNI servername (client-side)
    pub servername: Option<String>,

    /// Whether session was resumed
    pub sess_reused: bool,

    /// Certificate chain (index 0 is peer cert)
    pub cert_chain: Vec<CertInfo>,
}

impl SessionInfo {
    /// Create session info from an established SSL connection
    pub fn from_ssl(ssl: &SslRef) -> Self {
        let (cipher, cipher_bits) = ssl
            .current_cipher()
            .map(|c| (c.name().to_string(), c.bits().secret))
            .unwrap_or_else(|| ("<undef>".to_string(), 0));

        SessionInfo {
            version: ssl.version_str().to_string(),
            cipher,
            cipher_bits,
            servername: ssl
                .servername(openssl::ssl::NameType::HOST_NAME)
                .map(|s| s.to_string()),
            sess_reused: ssl.session_reused(),
            cert_chain: get_cert_chain(ssl),
        }
    }

    /// Peer certificate, if one was presented
    pub fn peer_certificate(&self) -> Option<&CertInfo> {
        self.cert(0)
    }

    /// Get certificate info by index (0 = peer cert, 1+ = chain)
    pub fn cert(&self, index: usize) -> Option<&CertInfo> {
        self.cert_chain.get(index)
    }
}

impl Default for SessionInfo {
    fn default() -> Self {
        SessionInfo {
            version: "<undef>".to_string(),
            cipher: "<undef>".to_string(),
            cipher_bits: 0,
            servername: None,
            sess_reused: false,
            cert_chain: Vec::new(),
        }
    }
}

impl fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({} bits)", self.version, self.cipher, self.cipher_bits)?;
        match self.peer_certificate() {
            Some(cert) => write!(f, " peer: {}", cert),
            None => write!(f, " peer: <none>"),
        }
    }
}
