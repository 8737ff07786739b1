//! Trust configuration
//!
//! A [`TrustConfig`] names the endpoint and the certificate material used to
//! authenticate each side. It carries no behavior besides validation; the
//! contexts are built in [`super::context`].

use super::TlsError;
use std::path::{Path, PathBuf};

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.0 (parsed for diagnostics, rejected by validation)
    Tls10,
    /// TLS 1.1 (parsed for diagnostics, rejected by validation)
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Lowest version the rendezvous protocol accepts
    pub const MINIMUM: TlsVersion = TlsVersion::Tls12;

    /// Parse TLS version from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self, TlsError> {
        match s.to_uppercase().as_str() {
            "TLSV1.0" | "TLS1.0" | "TLSV1" | "TLS1" => Ok(TlsVersion::Tls10),
            "TLSV1.1" | "TLS1.1" => Ok(TlsVersion::Tls11),
            "TLSV1.2" | "TLS1.2" => Ok(TlsVersion::Tls12),
            "TLSV1.3" | "TLS1.3" => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::InvalidVersion(s.to_string())),
        }
    }

    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(&self) -> openssl::ssl::SslVersion {
        use openssl::ssl::SslVersion;
        match self {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    /// Get version as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls10 => "TLSv1.0",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

impl std::str::FromStr for TlsVersion {
    type Err = TlsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TlsVersion::parse(s)
    }
}

/// Whether the client must authenticate itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Only the server presents a certificate
    ServerOnly,
    /// Both peers present and verify certificates
    Mutual,
}

/// How the client authenticates the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerTrust {
    /// Operating system default trust store (CA-signed server)
    SystemStore,
    /// Explicit certificate or bundle (pinned self-signed server or private CA)
    Anchor(PathBuf),
}

/// Certificate material for one side of a rendezvous
///
/// On the server, `identity_cert`/`identity_key` are the server's own
/// credentials and `peer_trust_anchor` verifies clients. On the client, the
/// identity is optional and `peer_trust_anchor` pins the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustConfig {
    pub host: String,
    pub port: u16,
    pub identity_cert: Option<PathBuf>,
    /// Private key; read from `identity_cert` when unset (combined PEM)
    pub identity_key: Option<PathBuf>,
    pub peer_trust_anchor: Option<PathBuf>,
    pub require_peer_cert: bool,
    pub min_version: TlsVersion,
    pub max_version: Option<TlsVersion>,
}

impl TrustConfig {
    /// Server-only authentication with the given identity
    pub fn server(
        host: impl Into<String>,
        port: u16,
        cert: impl AsRef<Path>,
        key: impl AsRef<Path>,
    ) -> Self {
        TrustConfig {
            identity_cert: Some(cert.as_ref().to_path_buf()),
            identity_key: Some(key.as_ref().to_path_buf()),
            ..Self::new(host, port)
        }
    }

    /// Client trusting the system store, presenting no certificate
    pub fn client(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port)
    }

    fn new(host: impl Into<String>, port: u16) -> Self {
        TrustConfig {
            host: host.into(),
            port,
            identity_cert: None,
            identity_key: None,
            peer_trust_anchor: None,
            require_peer_cert: false,
            min_version: TlsVersion::MINIMUM,
            max_version: None,
        }
    }

    /// Require the peer to present a certificate chaining to `anchor`
    pub fn require_peer_cert(mut self, anchor: impl AsRef<Path>) -> Self {
        self.peer_trust_anchor = Some(anchor.as_ref().to_path_buf());
        self.require_peer_cert = true;
        self
    }

    /// Verify the peer against `anchor` instead of the system store
    pub fn trust_anchor(mut self, anchor: impl AsRef<Path>) -> Self {
        self.peer_trust_anchor = Some(anchor.as_ref().to_path_buf());
        self
    }

    /// Present this certificate and key during the handshake
    pub fn identity(mut self, cert: impl AsRef<Path>, key: impl AsRef<Path>) -> Self {
        self.identity_cert = Some(cert.as_ref().to_path_buf());
        self.identity_key = Some(key.as_ref().to_path_buf());
        self
    }

    /// Set TLS version (both min and max)
    pub fn version(mut self, version: TlsVersion) -> Self {
        self.min_version = version;
        self.max_version = Some(version);
        self
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.min_version = min;
        self.max_version = Some(max);
        self
    }

    /// Authentication mode implied by the populated fields
    pub fn auth_mode(&self) -> AuthMode {
        if self.require_peer_cert {
            AuthMode::Mutual
        } else {
            AuthMode::ServerOnly
        }
    }

    /// Server trust source implied by the populated fields (client role)
    pub fn server_trust(&self) -> ServerTrust {
        match &self.peer_trust_anchor {
            Some(path) => ServerTrust::Anchor(path.clone()),
            None => ServerTrust::SystemStore,
        }
    }

    /// Key path, falling back to the certificate file
    pub fn identity_key_path(&self) -> Option<&Path> {
        self.identity_key
            .as_deref()
            .or(self.identity_cert.as_deref())
    }

    /// Check the invariants shared by both roles
    pub fn validate(&self) -> Result<(), TlsError> {
        if self.host.is_empty() {
            return Err(TlsError::InvalidConfig("host is empty".to_string()));
        }
        if self.require_peer_cert && self.peer_trust_anchor.is_none() {
            return Err(TlsError::InvalidConfig(
                "peer certificate required but no trust anchor configured".to_string(),
            ));
        }
        if self.identity_key.is_some() && self.identity_cert.is_none() {
            return Err(TlsError::InvalidConfig(
                "identity key given without a certificate".to_string(),
            ));
        }
        if self.min_version < TlsVersion::MINIMUM {
            return Err(TlsError::InvalidVersion(format!(
                "{} is below the {} minimum",
                self.min_version.as_str(),
                TlsVersion::MINIMUM.as_str()
            )));
        }
        if let Some(max) = self.max_version {
            if max < self.min_version {
                return Err(TlsError::InvalidVersion(format!(
                    "maximum {} is below minimum {}",
                    max.as_str(),
                    self.min_version.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Check the invariants of the server role
    pub fn validate_server(&self) -> Result<(), TlsError> {
        self.validate()?;
        if self.identity_cert.is_none() {
            return Err(TlsError::InvalidConfig(
                "server requires an identity certificate".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_version_parsing() {
        assert_eq!(TlsVersion::parse("TLSv1.2").unwrap(), TlsVersion::Tls12);
        assert_eq!("tlsv1.3".parse::<TlsVersion>().unwrap(), TlsVersion::Tls13);
        assert_eq!(TlsVersion::parse("TLS1.0").unwrap(), TlsVersion::Tls10);
        assert!(TlsVersion::parse("SSLv3").is_err());
    }

    #[test]
    fn test_auth_mode_follows_fields() {
        let cfg = TrustConfig::server("localhost", 1, "s.pem", "s.key");
        assert_eq!(cfg.auth_mode(), AuthMode::ServerOnly);

        let cfg = cfg.require_peer_cert("clients.pem");
        assert_eq!(cfg.auth_mode(), AuthMode::Mutual);
        assert!(cfg.validate_server().is_ok());
    }

    #[test]
    fn test_server_trust_follows_anchor() {
        let cfg = TrustConfig::client("localhost", 1);
        assert_eq!(cfg.server_trust(), ServerTrust::SystemStore);

        let cfg = cfg.trust_anchor("server.pem");
        assert_eq!(cfg.server_trust(), ServerTrust::Anchor(PathBuf::from("server.pem")));
        assert_eq!(cfg.auth_mode(), AuthMode::ServerOnly);
    }

    #[test]
    fn test_require_peer_cert_needs_anchor() {
        let mut cfg = TrustConfig::server("localhost", 1, "s.pem", "s.key");
        cfg.require_peer_cert = true;
        assert!(matches!(cfg.validate(), Err(TlsError::InvalidConfig(_))));
    }

    #[test]
    fn test_server_needs_identity() {
        let cfg = TrustConfig::client("localhost", 1);
        assert!(cfg.validate().is_ok());
        assert!(matches!(cfg.validate_server(), Err(TlsError::InvalidConfig(_))));
    }

    #[test]
    fn test_version_bounds() {
        let cfg = TrustConfig::client("localhost", 1).version(TlsVersion::Tls11);
        assert!(matches!(cfg.validate(), Err(TlsError::InvalidVersion(_))));

        let cfg = TrustConfig::client("localhost", 1)
            .version_range(TlsVersion::Tls13, TlsVersion::Tls12);
        assert!(matches!(cfg.validate(), Err(TlsError::InvalidVersion(_))));
    }

    #[test]
    fn test_key_falls_back_to_cert() {
        let mut cfg = TrustConfig::server("localhost", 1, "combined.pem", "combined.pem");
        cfg.identity_key = None;
        assert_eq!(cfg.identity_key_path(), Some(Path::new("combined.pem")));
    }
}
