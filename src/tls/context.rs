//! TLS context construction
//!
//! [`TlsContextBuilder`] is the only place where a [`TrustConfig`] turns into
//! OpenSSL verification settings. The result is an immutable [`TlsContext`]
//! that is cheap to clone and safe to share between accept threads.

use super::config::{AuthMode, ServerTrust, TrustConfig};
use super::session::TlsSession;
use super::{Result, TlsError};
use openssl::pkey::PKey;
use openssl::ssl::{SslContext, SslContextBuilder, SslMethod, SslVerifyMode};
use openssl::x509::X509;
use std::net::{IpAddr, TcpStream};
use std::path::Path;

/// Which end of the handshake a context drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// TLS context (immutable after building)
#[derive(Clone)]
pub struct TlsContext {
    pub(crate) ctx: SslContext,
    pub(crate) role: Role,
    pub(crate) auth_mode: AuthMode,
    // Client-specific: name checked against the server certificate
    pub(crate) server_name: Option<String>,
}

impl TlsContext {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    /// Connect to a server with TLS (client-side)
    pub fn connect(&self, stream: TcpStream) -> Result<TlsSession> {
        if self.role != Role::Client {
            return Err(TlsError::InvalidConfig(
                "Cannot use server context for client connection".to_string(),
            ));
        }
        TlsSession::connect(stream, self)
    }

    /// Accept a client connection with TLS (server-side)
    pub fn accept(&self, stream: TcpStream) -> Result<TlsSession> {
        if self.role != Role::Server {
            return Err(TlsError::InvalidConfig(
                "Cannot use client context for server accept".to_string(),
            ));
        }
        TlsSession::accept(stream, self)
    }
}

/// Builds server and client contexts from a [`TrustConfig`]
pub struct TlsContextBuilder;

impl TlsContextBuilder {
    /// Build the server context
    ///
    /// Loads the identity certificate (with any chain that follows it in the
    /// file) and key. With `require_peer_cert`, clients must present a
    /// certificate that verifies against the trust anchor, whose certificates
    /// are also advertised as acceptable client CAs.
    pub fn build_server_context(cfg: &TrustConfig) -> Result<TlsContext> {
        cfg.validate_server()?;

        let mut builder = SslContextBuilder::new(SslMethod::tls_server())?;
        apply_versions(&mut builder, cfg)?;
        load_identity(&mut builder, cfg)?;

        match cfg.auth_mode() {
            AuthMode::Mutual => {
                let anchor = cfg.peer_trust_anchor.as_deref().ok_or_else(|| {
                    TlsError::InvalidConfig("missing client trust anchor".to_string())
                })?;
                for cert in load_certs(anchor)? {
                    builder.add_client_ca(&cert)?;
                    builder.cert_store_mut().add_cert(cert)?;
                }
                builder.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
            }
            AuthMode::ServerOnly => {
                builder.set_verify(SslVerifyMode::NONE);
            }
        }

        Ok(TlsContext {
            ctx: builder.build(),
            role: Role::Server,
            auth_mode: cfg.auth_mode(),
            server_name: None,
        })
    }

    /// Build the client context
    ///
    /// The server certificate is always verified, either against the system
    /// trust store or against the configured anchor. A client identity is
    /// loaded when one is configured.
    pub fn build_client_context(cfg: &TrustConfig) -> Result<TlsContext> {
        cfg.validate()?;

        let mut builder = SslContextBuilder::new(SslMethod::tls_client())?;
        apply_versions(&mut builder, cfg)?;

        match cfg.server_trust() {
            ServerTrust::SystemStore => builder.set_default_verify_paths()?,
            ServerTrust::Anchor(path) => {
                for cert in load_certs(&path)? {
                    builder.cert_store_mut().add_cert(cert)?;
                }
            }
        }
        builder.set_verify(SslVerifyMode::PEER);

        let auth_mode = if cfg.identity_cert.is_some() {
            load_identity(&mut builder, cfg)?;
            AuthMode::Mutual
        } else {
            AuthMode::ServerOnly
        };

        Ok(TlsContext {
            ctx: builder.build(),
            role: Role::Client,
            auth_mode,
            server_name: Some(cfg.host.clone()),
        })
    }
}

/// Per-connection handle configured for the client's server-name checks
pub(crate) fn client_ssl(ctx: &TlsContext) -> Result<openssl::ssl::Ssl> {
    let mut ssl = openssl::ssl::Ssl::new(&ctx.ctx)?;

    if let Some(name) = &ctx.server_name {
        match name.parse::<IpAddr>() {
            Ok(ip) => ssl.param_mut().set_ip(ip)?,
            Err(_) => {
                ssl.set_hostname(name)?;
                ssl.param_mut().set_host(name)?;
            }
        }
    }

    Ok(ssl)
}

fn apply_versions(builder: &mut SslContextBuilder, cfg: &TrustConfig) -> Result<()> {
    builder.set_min_proto_version(Some(cfg.min_version.to_openssl_version()))?;
    builder.set_max_proto_version(cfg.max_version.map(|v| v.to_openssl_version()))?;
    Ok(())
}

fn load_identity(builder: &mut SslContextBuilder, cfg: &TrustConfig) -> Result<()> {
    let (cert_path, key_path) = match (cfg.identity_cert.as_deref(), cfg.identity_key_path()) {
        (Some(cert), Some(key)) => (cert, key),
        _ => return Ok(()),
    };

    let mut chain = load_certs(cert_path)?.into_iter();
    let leaf = chain.next().ok_or_else(|| load_error(cert_path, "no certificate found"))?;
    builder.set_certificate(&leaf)?;
    for intermediate in chain {
        builder.add_extra_chain_cert(intermediate)?;
    }

    let key_pem = read_file(key_path)?;
    let key = PKey::private_key_from_pem(&key_pem)
        .map_err(|e| load_error(key_path, format!("Failed to load private key: {}", e)))?;
    builder.set_private_key(&key)?;

    builder
        .check_private_key()
        .map_err(|e| load_error(key_path, format!("Key does not match certificate: {}", e)))?;

    Ok(())
}

/// Read every certificate in a PEM file
fn load_certs(path: &Path) -> Result<Vec<X509>> {
    let pem = read_file(path)?;
    let certs = X509::stack_from_pem(&pem)
        .map_err(|e| load_error(path, format!("Failed to load certificate: {}", e)))?;
    if certs.is_empty() {
        return Err(load_error(path, "no certificate found"));
    }
    Ok(certs)
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| load_error(path, e.to_string()))
}

fn load_error(path: &Path, reason: impl Into<String>) -> TlsError {
    TlsError::CertificateLoad {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}
