//! Murmur CLI - live voice cleanup and offline effect analysis

mod commands;
mod console;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Used when neither `--log-level` nor `RUST_LOG` is set
const DEFAULT_LOG_FILTER: &str = "murmur=info";

#[derive(Parser)]
#[command(name = "murmur")]
#[command(author, version, about = "Real-time voice cleanup pipeline", long_about = None)]
struct Cli {
    /// Log filter, e.g. "debug" or "murmur_core=trace" (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline between two audio devices with console controls
    Live(commands::LiveArgs),

    /// List audio devices
    Devices(commands::DevicesArgs),

    /// Run one effect over a WAV file and write per-block statistics
    Analyze(commands::AnalyzeArgs),
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    info!("Starting Murmur {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Live(args) => commands::live(args),
        Commands::Devices(args) => commands::devices(args),
        Commands::Analyze(args) => commands::analyze(args),
    }
}
