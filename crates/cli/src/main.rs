//! shellyctl - Shelly firmware updater
//!
//! Discovers Shelly devices on the local network (mDNS plus an HTTP
//! subnet sweep, or explicitly named hosts) and upgrades their firmware
//! from the vendor catalogs, honouring the mandatory stepping-stone
//! version for Gen2+ devices on old firmware.

#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::SharedArgs;

#[derive(Parser)]
#[command(name = "shellyctl")]
#[command(about = "Shelly firmware updater")]
#[command(version)]
#[command(long_about = "
shellyctl discovers Shelly devices on the local network and upgrades
their firmware. Running it with no subcommand behaves like `shellyctl
upgrade`. Use --json for machine-readable output suitable for scripting.
")]
struct Cli {
    #[command(flatten)]
    shared: SharedArgs,

    /// Force upgrades without asking for confirmation
    #[arg(short = 'f', long)]
    force: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover devices and upgrade firmware
    Upgrade {
        /// Force upgrades without asking for confirmation
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Discover devices and list available updates
    List,

    /// Show version information
    Version,
}

fn configure_logging(json: bool, verbose: bool) {
    // JSON mode keeps stdout machine-readable and drops the logs
    // entirely; otherwise logs go to stderr.
    if json {
        return;
    }

    let level = if verbose { "debug" } else { "info" };
    let directives = format!(
        "warn,shellyctl={level},shellyota_net={level},shellyota_device={level},\
         shellyota_catalog={level},shellyota_discovery={level},shellyota_server={level},\
         shellyota_service={level}"
    );

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| directives.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn print_version() {
    let commit = option_env!("SHELLYCTL_COMMIT").unwrap_or("none");
    let date = option_env!("SHELLYCTL_BUILD_DATE").unwrap_or("unknown");
    println!("shellyctl {} ({} {})", env!("CARGO_PKG_VERSION"), commit, date);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    configure_logging(cli.shared.json, cli.shared.verbose);

    let json = cli.shared.json;
    let result = execute_command(&cli).await;

    if let Err(err) = result {
        if json {
            output::print_error_json(&err);
        } else {
            output::print_error_human(&err);
        }
        std::process::exit(1);
    }
}

async fn execute_command(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        // Bare `shellyctl` behaves like `shellyctl upgrade`.
        None => commands::upgrade::execute(&cli.shared, cli.force).await,
        Some(Commands::Upgrade { force }) => {
            commands::upgrade::execute(&cli.shared, cli.force || *force).await
        }
        Some(Commands::List) => commands::list::execute(&cli.shared).await,
        Some(Commands::Version) => {
            print_version();
            Ok(())
        }
    }
}
