use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tls_rendezvous::client::ClientSession;
use tls_rendezvous::config::{self, RendezvousConfig};
use tls_rendezvous::hostname;

#[derive(Parser)]
#[command(name = "rendezvous-client")]
#[command(
    about = "Ask a rendezvous server which address this host connects from",
    long_about = None
)]
struct Cli {
    /// TOML configuration file; flags override its [client] table
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host name or address
    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Pinned server certificate or CA bundle; the system store otherwise
    #[arg(long)]
    server_ca: Option<PathBuf>,

    /// Client certificate for mutual authentication
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Client private key; read from --cert when omitted
    #[arg(long)]
    key: Option<PathBuf>,

    /// Identity to report instead of the local FQDN
    #[arg(long)]
    hostname: Option<String>,

    #[arg(long)]
    min_version: Option<String>,

    #[arg(long)]
    max_version: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn merge(self, mut file: RendezvousConfig) -> config::ClientSection {
        let section = &mut file.client;
        if let Some(host) = self.host {
            section.host = host;
        }
        if let Some(port) = self.port {
            section.port = port;
        }
        if self.server_ca.is_some() {
            section.server_ca = self.server_ca;
        }
        if self.cert.is_some() {
            section.cert = self.cert;
        }
        if self.key.is_some() {
            section.key = self.key;
        }
        if self.hostname.is_some() {
            section.hostname = self.hostname;
        }
        if self.min_version.is_some() {
            section.min_version = self.min_version;
        }
        if self.max_version.is_some() {
            section.max_version = self.max_version;
        }
        file.client
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = tls_rendezvous::logging::init(&cli.log_level) {
        eprintln!("Error: failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let file = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => RendezvousConfig::default(),
    };
    let section = cli.merge(file);
    let trust = section.trust_config()?;

    let identity = match section.hostname {
        Some(name) => name,
        None => hostname::local_fqdn()?,
    };

    let mut session = ClientSession::connect(&trust)?;
    let info = session.info();
    println!("Connected to {} ({})", trust.host, session.server());
    println!("Protocol: {}", info.version);
    println!("Cipher: {} ({} bits)", info.cipher, info.cipher_bits);
    for (depth, cert) in info.cert_chain.iter().enumerate() {
        println!("Certificate {}: {}", depth, cert);
    }

    let reply = session.exchange(&identity)?;
    session.close();

    println!("Sent: {}", identity);
    println!("Observed address: {}", reply);
    Ok(())
}
