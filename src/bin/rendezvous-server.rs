use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tls_rendezvous::config::{self, RendezvousConfig};
use tls_rendezvous::server::{self, Server, Strategy};

#[derive(Parser)]
#[command(name = "rendezvous-server")]
#[command(about = "Tell TLS clients which address they connect from", long_about = None)]
struct Cli {
    /// TOML configuration file; flags override its [server] table
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Server certificate (PEM, may include the chain)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Server private key; read from --cert when omitted
    #[arg(long)]
    key: Option<PathBuf>,

    /// Require client certificates verified against this bundle
    #[arg(long)]
    client_ca: Option<PathBuf>,

    /// multiplexed | thread-per-connection
    #[arg(long)]
    strategy: Option<Strategy>,

    /// Per-connection deadline in seconds, 0 for none
    #[arg(long)]
    deadline_secs: Option<u64>,

    #[arg(long)]
    min_version: Option<String>,

    #[arg(long)]
    max_version: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn merge(self, mut file: RendezvousConfig) -> config::ServerSection {
        let section = &mut file.server;
        if let Some(host) = self.host {
            section.host = host;
        }
        if let Some(port) = self.port {
            section.port = port;
        }
        if self.cert.is_some() {
            section.cert = self.cert;
        }
        if self.key.is_some() {
            section.key = self.key;
        }
        if self.client_ca.is_some() {
            section.client_ca = self.client_ca;
        }
        if let Some(strategy) = self.strategy {
            section.strategy = strategy;
        }
        if self.deadline_secs.is_some() {
            section.deadline_secs = self.deadline_secs;
        }
        if self.min_version.is_some() {
            section.min_version = self.min_version;
        }
        if self.max_version.is_some() {
            section.max_version = self.max_version;
        }
        file.server
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
            tracing::error!(error = %e, "Server failed");
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
    let options = section.options();

    let server = Server::bind(&trust, options)?;
    server::install_interrupt_handler(&server.shutdown_handle())?;

    tracing::info!(
        address = %server.local_addr(),
        deadline = ?options.deadline.map(|d: Duration| d.as_secs()),
        "Ready; interrupt to stop"
    );
    server.run()?;
    Ok(())
}
