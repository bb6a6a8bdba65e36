//! picoguard CLI - host-side diagnostics for the tunnel manager
//!
//! Checks tunnel configuration files, exercises the endpoint resolver,
//! runs the platform self-test and sends handshake kick probes.

use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use picoguard::logging::init_logging;
use picoguard::platform::self_test;
use picoguard::tunnel::{ProbeTransport, UdpProbe};
use picoguard::{HostPlatform, PicoGuardError, Resolver, TunnelConfig};

/// picoguard - WireGuard tunnel manager diagnostics
#[derive(Parser, Debug)]
#[command(name = "picoguard")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate a WireGuard configuration file
    Check {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Resolve an endpoint host to an IPv4 address
    Resolve {
        /// Dotted-quad literal or host name
        host: String,
    },

    /// Run the platform self-test
    Selftest,

    /// Send a single handshake kick datagram
    Probe {
        /// Target address, e.g. 10.8.0.1:9
        target: SocketAddrV4,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose) {
        eprintln!("Warning: could not set up logging: {}", e);
    }

    match run(args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e.user_message());
            ExitCode::from(e.exit_code().clamp(1, 255) as u8)
        }
    }
}

async fn run(command: Command) -> Result<(), PicoGuardError> {
    match command {
        Command::Check { config } => {
            tracing::info!("Loading configuration from: {}", config.display());
            let config = TunnelConfig::from_file(&config)?;
            config.validate()?;

            println!("local address:  {}", config.local_address);
            println!(
                "endpoint:       {}:{}",
                config.endpoint_host, config.endpoint_port
            );
            println!(
                "allowed range:  {}/{}",
                config.allowed_address, config.allowed_mask
            );
            println!("routing mode:   {:?}", config.routing_mode());
            println!("listen port:    {}", config.effective_listen_port());
            Ok(())
        }

        Command::Resolve { host } => {
            let addr = Resolver::default().resolve(&host).await?;
            println!("{}", addr);
            Ok(())
        }

        Command::Selftest => {
            let platform = HostPlatform::new();
            let report = self_test(&platform)?;

            println!("random:    {}", hex::encode(report.random_sample));
            println!("tick (ms): {}", report.monotonic_ms);
            println!("tai64n:    {}", hex::encode(report.tai64n));
            println!("load:      {}", if report.under_load { "high" } else { "normal" });
            Ok(())
        }

        Command::Probe { target } => {
            UdpProbe.send_probe(target).await?;
            println!("sent {} byte(s) to {}", picoguard::tunnel::PROBE_PAYLOAD.len(), target);
            Ok(())
        }
    }
}
