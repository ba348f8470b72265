//! natscout CLI
//!
//! NAT classification and mapped UDP sockets over RFC 3489 STUN

mod config;

use clap::{Parser, Subcommand};
use natscout_discovery::{MappedSocket, StunClient};
use natscout_transport::{InterfaceProvider, SystemInterfaces};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use config::Config;

/// natscout - discover your NAT and open sockets through it
#[derive(Parser)]
#[command(name = "natscout")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// STUN server, host or host:port
    #[arg(short, long)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the NAT between this host and the STUN server
    NatType {
        /// Ignore the cached result
        #[arg(long)]
        force: bool,
    },

    /// Print the public IPv4 address
    ExternalAddress {
        /// Accept a cached address up to this many seconds old
        #[arg(long, default_value_t = 30)]
        max_age: u64,
    },

    /// List local IPv4 interfaces
    Interfaces,

    /// Open one mapped UDP socket
    Socket {
        /// Local address to bind
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: Ipv4Addr,

        /// Local port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Open an RTP/RTCP socket pair with adjacent external ports
    Pair {
        /// Local address to bind
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: Ipv4Addr,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    if let Some(server) = cli.server {
        config.stun.server = Some(server);
    }
    config.validate()?;

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match cli.command {
        Commands::Interfaces => list_interfaces()?,
        Commands::NatType { force } => {
            let client = build_client(config)?;
            println!("NAT type: {}", client.nat_type(force));
            if let Some(iface) = client.interface_address() {
                println!("Interface: {iface}");
            }
        }
        Commands::ExternalAddress { max_age } => {
            let client = build_client(config)?;
            let addr = client.external_address(Duration::from_secs(max_age))?;
            println!("External address: {addr}");
        }
        Commands::Socket { bind, port } => {
            let client = build_client(config)?;
            let socket = client.create_socket(bind, port)?;
            println!("NAT type: {}", client.nat_type(false));
            print_mapping("Socket", &socket);
        }
        Commands::Pair { bind } => {
            let client = build_client(config)?;
            let (rtp, rtcp) = client.create_socket_pair(bind)?;
            println!("NAT type: {}", client.nat_type(false));
            print_mapping("RTP", &rtp);
            print_mapping("RTCP", &rtcp);
        }
    }

    Ok(())
}

fn build_client(config: Config) -> anyhow::Result<StunClient> {
    if config.stun.server.is_none() {
        anyhow::bail!("No STUN server configured (use --server or set stun.server in the config file)");
    }
    Ok(StunClient::new(config.stun)?)
}

fn print_mapping(label: &str, socket: &MappedSocket) {
    println!("{label}: {} -> {}", socket.local_addr(), socket.external_addr());
}

fn list_interfaces() -> anyhow::Result<()> {
    let interfaces = SystemInterfaces.interfaces()?;
    if interfaces.is_empty() {
        println!("No IPv4 interfaces found");
        return Ok(());
    }

    for iface in interfaces {
        let note = if iface.is_loopback { " (loopback)" } else { "" };
        println!("{:<12} {}{}", iface.name, iface.addr, note);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_socket_command() {
        let cli = Cli::try_parse_from(["natscout", "--server", "127.0.0.1:3478", "socket", "--port", "6000"]).unwrap();
        assert_eq!(cli.server.as_deref(), Some("127.0.0.1:3478"));
        match cli.command {
            Commands::Socket { bind, port } => {
                assert_eq!(bind, Ipv4Addr::UNSPECIFIED);
                assert_eq!(port, Some(6000));
            }
            _ => panic!("expected socket command"),
        }
    }

    #[test]
    fn test_parse_nat_type_force() {
        let cli = Cli::try_parse_from(["natscout", "-v", "nat-type", "--force"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::NatType { force: true }));
    }

    #[test]
    fn test_rejects_bad_bind() {
        assert!(Cli::try_parse_from(["natscout", "pair", "--bind", "not-an-ip"]).is_err());
    }
}
