//! Certificate handling and parsing
//!
//! This module extracts the fields of X.509 certificates that the server logs
//! on accept and the client reports after the handshake.

use openssl::asn1::Asn1TimeRef;
use openssl::nid::Nid;
use openssl::x509::{X509NameRef, X509Ref};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Certificate information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Certificate subject (Common Name)
    pub subject: String,
    /// Certificate issuer (Common Name)
    pub issuer: String,
    /// Subject Alternative Names (DNS names and IP addresses)
    pub subject_alt_names: Vec<String>,
    /// Serial number in upper-case hex
    pub serial: String,
    pub not_before: String,
    pub not_after: String,
}

impl CertInfo {
    /// Extract certificate information from an X.509 certificate
    pub fn from_x509(cert: &X509Ref) -> Self {
        CertInfo {
            subject: Self::get_cn(cert.subject_name()),
            issuer: Self::get_cn(cert.issuer_name()),
            subject_alt_names: Self::get_subject_alt_names(cert),
            serial: cert
                .serial_number()
                .to_bn()
                .and_then(|bn| bn.to_hex_str().map(|s| s.to_string()))
                .unwrap_or_else(|_| "<undef>".to_string()),
            not_before: Self::format_time(cert.not_before()),
            not_after: Self::format_time(cert.not_after()),
        }
    }

    /// Whether subject and issuer coincide
    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }

    /// Get Common Name from X509_NAME
    fn get_cn(name: &X509NameRef) -> String {
        name.entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "<undef>".to_string())
    }

    fn get_subject_alt_names(cert: &X509Ref) -> Vec<String> {
        let mut names = Vec::new();

        if let Some(san_ext) = cert.subject_alt_names() {
            for name in san_ext {
                if let Some(dns) = name.dnsname() {
                    names.push(format!("DNS:{}", dns));
                } else if let Some(ip) = name.ipaddress() {
                    if let Ok(octets) = <[u8; 4]>::try_from(ip) {
                        names.push(format!("IP:{}", Ipv4Addr::from(octets)));
                    } else if let Ok(octets) = <[u8; 16]>::try_from(ip) {
                        names.push(format!("IP:{}", Ipv6Addr::from(octets)));
                    }
                }
            }
        }

        names
    }

    fn format_time(time: &Asn1TimeRef) -> String {
        time.to_string()
    }
}

impl fmt::Display for CertInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "subject={} issuer={} serial={} valid={}..{}",
            self.subject, self.issuer, self.serial, self.not_before, self.not_after
        )?;
        if !self.subject_alt_names.is_empty() {
            write!(f, " san=[{}]", self.subject_alt_names.join(", "))?;
        }
        Ok(())
    }
}

/// Extract certificate chain information from SSL connection
///
/// Index 0 is the peer certificate. On the client, OpenSSL's peer chain
/// already starts with the leaf, so it is not repeated.
pub fn get_cert_chain(ssl: &openssl::ssl::SslRef) -> Vec<CertInfo> {
    let mut chain = Vec::new();

    let peer = ssl.peer_certificate();
    if let Some(peer_cert) = &peer {
        chain.push(CertInfo::from_x509(peer_cert));
    }

    if let Some(cert_chain) = ssl.peer_cert_chain() {
        for cert in cert_chain {
            let info = CertInfo::from_x509(cert);
            if chain.first() != Some(&info) {
                chain.push(info);
            }
        }
    }

    chain
}
