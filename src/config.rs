//! Configuration file
//!
//! A TOML file with optional `[server]` and `[client]` tables. The binaries
//! load it first and then apply their command-line flags on top.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 30046
//! cert = "/etc/rendezvous/server.crt"
//! key = "/etc/rendezvous/server.key"
//! client_ca = "/etc/rendezvous/clients.crt"
//! strategy = "multiplexed"
//! deadline_secs = 10
//!
//! [client]
//! host = "rendezvous.example.org"
//! port = 30046
//! server_ca = "/etc/rendezvous/server.crt"
//! cert = "/etc/rendezvous/client-1.crt"
//! key = "/etc/rendezvous/client-1.key"
//! ```

use crate::server::{ServerOptions, Strategy};
use crate::tls::{TlsError, TlsVersion, TrustConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port used when neither the file nor the command line names one
pub const DEFAULT_PORT: u16 = 30046;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<TlsError> for ConfigError {
    fn from(err: TlsError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendezvousConfig {
    pub server: ServerSection,
    pub client: ClientSection,
}

/// `[server]` table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    /// Client certificates or CA bundle; setting it requires client certificates
    pub client_ca: Option<PathBuf>,
    pub min_version: Option<String>,
    pub max_version: Option<String>,
    pub strategy: Strategy,
    /// Zero disables the per-connection deadline
    pub deadline_secs: Option<u64>,
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            cert: None,
            key: None,
            client_ca: None,
            min_version: None,
            max_version: None,
            strategy: Strategy::default(),
            deadline_secs: None,
        }
    }
}

/// `[client]` table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSection {
    pub host: String,
    pub port: u16,
    /// Pinned server certificate or private CA; the system store otherwise
    pub server_ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub min_version: Option<String>,
    pub max_version: Option<String>,
    /// Identity to send instead of the local FQDN
    pub hostname: Option<String>,
}

impl Default for ClientSection {
    fn default() -> Self {
        ClientSection {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            server_ca: None,
            cert: None,
            key: None,
            min_version: None,
            max_version: None,
            hostname: None,
        }
    }
}

/// Read and parse a configuration file
pub fn load_config(path: &Path) -> Result<RendezvousConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse configuration text
pub fn parse_config(content: &str) -> Result<RendezvousConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

impl ServerSection {
    pub fn trust_config(&self) -> Result<TrustConfig, ConfigError> {
        let cert = self
            .cert
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("server.cert is required".to_string()))?;

        let mut cfg = TrustConfig::client(self.host.clone(), self.port);
        cfg.identity_cert = Some(cert.clone());
        cfg.identity_key = self.key.clone();
        if let Some(anchor) = &self.client_ca {
            cfg = cfg.require_peer_cert(anchor);
        }
        apply_versions(&mut cfg, &self.min_version, &self.max_version)?;

        cfg.validate_server()?;
        Ok(cfg)
    }

    pub fn options(&self) -> ServerOptions {
        let options = ServerOptions::default().strategy(self.strategy);
        match self.deadline_secs {
            Some(0) => options.deadline(None),
            Some(secs) => options.deadline(Some(Duration::from_secs(secs))),
            None => options,
        }
    }
}

impl ClientSection {
    pub fn trust_config(&self) -> Result<TrustConfig, ConfigError> {
        let mut cfg = TrustConfig::client(self.host.clone(), self.port);
        if let Some(anchor) = &self.server_ca {
            cfg = cfg.trust_anchor(anchor);
        }
        cfg.identity_cert = self.cert.clone();
        cfg.identity_key = self.key.clone();
        apply_versions(&mut cfg, &self.min_version, &self.max_version)?;

        cfg.validate()?;
        Ok(cfg)
    }
}

fn apply_versions(
    cfg: &mut TrustConfig,
    min: &Option<String>,
    max: &Option<String>,
) -> Result<(), ConfigError> {
    if let Some(min) = min {
        cfg.min_version = TlsVersion::parse(min)?;
    }
    if let Some(max) = max {
        cfg.max_version = Some(TlsVersion::parse(max)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::{AuthMode, ServerTrust};
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.strategy, Strategy::Multiplexed);
        assert_eq!(config.client.host, "localhost");
    }

    #[test]
    fn test_mutual_server_section() {
        let config = parse_config(
            r#"
            [server]
            host = "127.0.0.1"
            port = 4433
            cert = "server.crt"
            key = "server.key"
            client_ca = "clients.crt"
            strategy = "threaded"
            deadline_secs = 3
            "#,
        )
        .unwrap();

        let cfg = config.server.trust_config().unwrap();
        assert_eq!(cfg.auth_mode(), AuthMode::Mutual);
        assert_eq!(cfg.port, 4433);
        assert_eq!(cfg.peer_trust_anchor, Some(PathBuf::from("clients.crt")));

        let options = config.server.options();
        assert_eq!(options.strategy, Strategy::ThreadPerConnection);
        assert_eq!(options.deadline, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_zero_deadline_disables_it() {
        let config = parse_config("[server]\ndeadline_secs = 0\n").unwrap();
        assert_eq!(config.server.options().deadline, None);
    }

    #[test]
    fn test_server_requires_cert() {
        let config = parse_config("[server]\nport = 1\n").unwrap();
        assert!(matches!(
            config.server.trust_config(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_client_section() {
        let config = parse_config(
            r#"
            [client]
            host = "rendezvous.example.org"
            server_ca = "pinned.crt"
            min_version = "TLSv1.3"
            hostname = "node-1.example.org"
            "#,
        )
        .unwrap();

        let cfg = config.client.trust_config().unwrap();
        assert_eq!(cfg.server_trust(), ServerTrust::Anchor(PathBuf::from("pinned.crt")));
        assert_eq!(cfg.min_version, TlsVersion::Tls13);
        assert_eq!(config.client.hostname.as_deref(), Some("node-1.example.org"));
    }

    #[test]
    fn test_old_version_rejected() {
        let config = parse_config("[client]\nmin_version = \"TLSv1.0\"\n").unwrap();
        assert!(matches!(
            config.client.trust_config(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            parse_config("[server]\ncertificate = \"x\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[client]\nport = 9000").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.client.port, 9000);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            load_config(&missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
