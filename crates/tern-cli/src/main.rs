//! tern CLI
//!
//! Detect the type of NAT between this machine and the internet with the
//! help of a remote detection server.

mod config;
mod host;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tern_nat::message::decode_detection_result;
use tern_nat::{DetectionConfig, MessageId, NatType, NatTypeDetectionClient, Packet};
use tern_transport::{MAX_DATAGRAM_SIZE, interfaces};
use tokio::net::UdpSocket;
use tracing_subscriber::EnvFilter;

use config::{Config, parse_server_addr};
use host::DatagramHost;

/// tern - find out what kind of NAT you are behind
#[derive(Parser)]
#[command(name = "tern")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run NAT type detection against a detection server
    Detect {
        /// Detection server (ip:port); falls back to the config file
        server: Option<String>,

        /// Timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Primary socket bind address
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// List this host's local addresses
    Interfaces,

    /// Print the effective configuration
    Config {
        /// Also write it to the config path
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = if cli.config.is_some() {
        Config::load(&config_path)?
    } else {
        Config::load_or_default(&config_path)?
    };
    config.validate()?;

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    match cli.command {
        Commands::Detect {
            server,
            timeout,
            bind,
        } => {
            let server = match server {
                Some(server) => parse_server_addr(&server)?,
                None => config.parse_server()?.ok_or_else(|| {
                    anyhow::anyhow!("No detection server given and none configured")
                })?,
            };
            let bind: SocketAddr = match bind {
                Some(bind) => bind.parse()?,
                None => config.parse_listen_addr()?,
            };
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.detection.timeout());
            if timeout.is_zero() {
                anyhow::bail!("Timeout must be at least 1 second");
            }

            let result =
                detect(server, bind, timeout, config.detection.update_interval()).await?;
            println!("NAT type: {}", result);
        }
        Commands::Interfaces => {
            show_interfaces()?;
        }
        Commands::Config { save } => {
            println!("# {}", config_path.display());
            print!("{}", toml::to_string_pretty(&config)?);
            if save {
                config.save(&config_path)?;
                tracing::info!("Configuration written to {}", config_path.display());
            }
        }
    }

    Ok(())
}

/// Run one detection end to end
async fn detect(
    server: SocketAddr,
    bind: SocketAddr,
    timeout: Duration,
    update_interval: Duration,
) -> anyhow::Result<NatType> {
    let socket = Arc::new(UdpSocket::bind(bind).await?);
    tracing::info!("Primary socket bound to {}", socket.local_addr()?);

    let host = Arc::new(DatagramHost::new(socket.clone()));
    let mut client = NatTypeDetectionClient::new(host.clone(), DetectionConfig::default());
    blocking(|| client.detect_nat_type(server))?;

    println!("Detection server: {}", server);
    if let Some(secondary) = client.secondary_socket() {
        println!("Secondary socket: {}", secondary.bound_addr());
    }

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut tick = tokio::time::interval(update_interval);
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            _ = &mut deadline => {
                blocking(|| client.shutdown());
                anyhow::bail!("No answer from {} within {:?}", server, timeout);
            }
            _ = tick.tick() => blocking(|| client.update()),
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, from)) => {
                    let packet = Packet::from_network(buf[..len].to_vec(), from);
                    blocking(|| client.on_receive(&packet));
                }
                Err(e) => tracing::warn!("Primary socket receive error: {}", e),
            },
        }

        while let Some(packet) = host.pop_pushed() {
            if let Some(result) = local_result(&packet) {
                blocking(|| client.shutdown());
                return Ok(result);
            }
            blocking(|| client.on_receive(&packet));
        }
    }
}

/// Run a client call that may join the receive thread
///
/// Completion and shutdown wait for the secondary socket's thread to exit.
/// Needs the multi-threaded runtime.
fn blocking<R>(f: impl FnOnce() -> R) -> R {
    tokio::task::block_in_place(f)
}

/// Result the detection client injected into the inbound stream
fn local_result(packet: &Packet) -> Option<NatType> {
    if !packet.locally_generated || packet.id() != Some(MessageId::DetectionResult.as_u8()) {
        return None;
    }
    decode_detection_result(&packet.data).ok()
}

/// Print host name and local addresses
fn show_interfaces() -> anyhow::Result<()> {
    println!("Host: {}", interfaces::hostname()?);

    let addresses = interfaces::local_addresses()?;
    if addresses.is_empty() {
        println!("No local addresses found");
    }
    for addr in addresses {
        let family = if addr.is_ipv4() { "IPv4" } else { "IPv6" };
        println!("  {:<4}  {}", family, addr);
    }
    Ok(())
}
