//! Throwaway certificate material for tests
//!
//! Generates a private CA, CA-signed and self-signed server and client
//! identities, and a client bundle, all written as PEM files into a temporary
//! directory that lives as long as the [`Pki`] value.

#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage,
    SubjectAlternativeName, SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Certificate and key written to disk
pub struct Identity {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub x509: X509,
    pub pkey: PKey<Private>,
}

/// Test PKI rooted in a temporary directory
pub struct Pki {
    pub dir: TempDir,
    pub ca: Identity,
    pub ca_server: Identity,
    pub self_signed_server: Identity,
    pub rogue_server: Identity,
    pub ca_client: Identity,
    pub self_signed_client: Identity,
    pub untrusted_client: Identity,
    /// Self-signed client certificates the server accepts
    pub clients_bundle: PathBuf,
    /// `self_signed_server` certificate and key in one file
    pub combined_server: PathBuf,
    /// A file that is not PEM at all
    pub garbage: PathBuf,
}

impl Pki {
    pub fn generate() -> Self {
        let dir = tempfile::tempdir().unwrap();

        let ca = issue(dir.path(), "ca", "Rendezvous Test CA", None, Kind::Authority);
        let ca_server = issue(dir.path(), "ca-server", "localhost", Some(&ca), Kind::Server);
        let self_signed_server =
            issue(dir.path(), "ss-server", "localhost", None, Kind::Server);
        let rogue_server = issue(dir.path(), "rogue-server", "localhost", None, Kind::Server);
        let ca_client = issue(dir.path(), "ca-client", "client-ca-1", Some(&ca), Kind::Client);
        let self_signed_client = issue(dir.path(), "ss-client", "client-1", None, Kind::Client);
        let second_client = issue(dir.path(), "ss-client-2", "client-2", None, Kind::Client);
        let untrusted_client = issue(dir.path(), "intruder", "intruder", None, Kind::Client);

        let clients_bundle = dir.path().join("clients.pem");
        let mut bundle = self_signed_client.x509.to_pem().unwrap();
        bundle.extend(second_client.x509.to_pem().unwrap());
        fs::write(&clients_bundle, bundle).unwrap();

        let combined_server = dir.path().join("ss-server-combined.pem");
        let mut combined = self_signed_server.x509.to_pem().unwrap();
        combined.extend(self_signed_server.pkey.private_key_to_pem_pkcs8().unwrap());
        fs::write(&combined_server, combined).unwrap();

        let garbage = dir.path().join("garbage.pem");
        fs::write(&garbage, b"this is not a certificate\n").unwrap();

        Pki {
            dir,
            ca,
            ca_server,
            self_signed_server,
            rogue_server,
            ca_client,
            self_signed_client,
            untrusted_client,
            clients_bundle,
            combined_server,
            garbage,
        }
    }

    /// Path inside the PKI directory that does not exist
    pub fn missing(&self) -> PathBuf {
        self.dir.path().join("does-not-exist.pem")
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Authority,
    Server,
    Client,
}

fn generate_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn issue(dir: &Path, stem: &str, cn: &str, issuer: Option<&Identity>, kind: Kind) -> Identity {
    let pkey = generate_key();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    let name = name.build();

    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&name).unwrap();
    match issuer {
        Some(ca) => builder.set_issuer_name(ca.x509.subject_name()).unwrap(),
        None => builder.set_issuer_name(&name).unwrap(),
    }
    builder.set_pubkey(&pkey).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(30).unwrap())
        .unwrap();

    // Self-signed leaves double as their own trust anchor.
    if kind == Kind::Authority || issuer.is_none() {
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
    } else {
        builder
            .append_extension(BasicConstraints::new().critical().build().unwrap())
            .unwrap();
    }

    let mut usage = KeyUsage::new();
    usage.critical().digital_signature();
    if kind == Kind::Authority || issuer.is_none() {
        usage.key_cert_sign();
    }
    if kind == Kind::Authority {
        usage.crl_sign();
    }
    builder.append_extension(usage.build().unwrap()).unwrap();

    match kind {
        Kind::Authority => {}
        Kind::Server => {
            builder
                .append_extension(ExtendedKeyUsage::new().server_auth().build().unwrap())
                .unwrap();
            let san = SubjectAlternativeName::new()
                .dns("localhost")
                .ip("127.0.0.1")
                .build(&builder.x509v3_context(issuer.map(|ca| &*ca.x509), None))
                .unwrap();
            builder.append_extension(san).unwrap();
        }
        Kind::Client => {
            builder
                .append_extension(ExtendedKeyUsage::new().client_auth().build().unwrap())
                .unwrap();
        }
    }

    let ski = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(ski).unwrap();

    if let Some(ca) = issuer {
        let aki = AuthorityKeyIdentifier::new()
            .keyid(false)
            .build(&builder.x509v3_context(Some(&*ca.x509), None))
            .unwrap();
        builder.append_extension(aki).unwrap();
    }

    let signer = issuer.map(|ca| &ca.pkey).unwrap_or(&pkey);
    builder.sign(signer, MessageDigest::sha256()).unwrap();
    let x509 = builder.build();

    let cert = dir.join(format!("{}.pem", stem));
    let key = dir.join(format!("{}.key", stem));
    fs::write(&cert, x509.to_pem().unwrap()).unwrap();
    fs::write(&key, pkey.private_key_to_pem_pkcs8().unwrap()).unwrap();

    Identity {
        cert,
        key,
        x509,
        pkey,
    }
}
