//! fcnet
//!
//! Entry point for the core process of an fcnet node. The supervisor runs
//! `fcnet core <TO_ANGEL> <FROM_ANGEL>` with two inherited pipe descriptors.

mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// fcnet - mesh node core process
#[derive(Parser)]
#[command(name = "fcnet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Settings file (TOML)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the core process (started by the supervisor)
    Core {
        /// Descriptor of the pipe to the supervisor
        #[arg(value_parser = parse_fd)]
        to_angel: i32,

        /// Descriptor of the pipe from the supervisor
        #[arg(value_parser = parse_fd)]
        from_angel: i32,
    },

    /// Generate a private key with a valid address
    Keygen,
}

fn parse_fd(value: &str) -> Result<i32, String> {
    match value.parse::<i32>() {
        Ok(fd) if fd > 0 => Ok(fd),
        _ => Err(format!("'{value}' is not a positive descriptor number")),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout belongs to keygen output
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Core {
            to_angel,
            from_angel,
        } => {
            let code = match core_main(to_angel, from_angel, cli.settings.as_deref()) {
                Ok(code) => code,
                Err(e) => {
                    tracing::error!("fatal: {e:#}");
                    1
                }
            };
            std::process::exit(code);
        }
        Commands::Keygen => generate_keypair(),
    }
}

/// Run the core on the supervisor pipes and return the exit status.
fn core_main(
    to_angel: i32,
    from_angel: i32,
    settings_path: Option<&std::path::Path>,
) -> anyhow::Result<i32> {
    if to_angel == from_angel {
        anyhow::bail!("to_angel and from_angel must be different descriptors");
    }
    let settings = config::load_or_default(settings_path)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let channel = open_pipes(to_angel, from_angel)?;
        let fcnet_core::ServeExit::Terminate(code) =
            fcnet_core::node::run(channel, &settings).await?;
        Ok::<_, anyhow::Error>(code)
    })
}

#[cfg(unix)]
fn open_pipes(to_angel: i32, from_angel: i32) -> anyhow::Result<fcnet_core::channel::PipeChannel> {
    use std::os::fd::{FromRawFd, OwnedFd};

    // SAFETY: the supervisor hands over both descriptors open, they are
    // distinct (checked by the caller), and nothing else in this process
    // takes ownership of them.
    let (to_angel, from_angel) =
        unsafe { (OwnedFd::from_raw_fd(to_angel), OwnedFd::from_raw_fd(from_angel)) };

    Ok(fcnet_core::channel::PipeChannel::from_pipes(
        from_angel, to_angel,
    )?)
}

#[cfg(not(unix))]
fn open_pipes(
    _to_angel: i32,
    _from_angel: i32,
) -> anyhow::Result<fcnet_core::Channel<tokio::io::Stdin, tokio::io::Stdout>> {
    anyhow::bail!("pipe descriptors are only supported on unix")
}

/// Print a fresh key pair whose address is in fc00::/8.
fn generate_keypair() -> anyhow::Result<()> {
    use zeroize::Zeroizing;

    let identity = fcnet_core::NetworkIdentity::generate()?;
    let private_hex = Zeroizing::new(hex::encode(identity.private_key().to_bytes()));

    println!("privateKey: {}", private_hex.as_str());
    println!("publicKey:  {}", hex::encode(identity.public_key().as_bytes()));
    println!("ipv6:       {}", identity.address());
    Ok(())
}
