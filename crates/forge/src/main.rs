//! forge CLI - incremental build system for C and C++

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use forge::commands;

/// forge - incremental build system for C and C++
#[derive(Debug, Parser)]
#[command(name = "forge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root directory
    #[arg(short = 'p', long, global = true)]
    project: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a new project
    Init(commands::init::InitArgs),

    /// Build targets in the project
    Build(commands::build::BuildArgs),

    /// Build and run an executable target
    Run(commands::run::RunArgs),

    /// Check the project configuration and toolchain
    Check(commands::check::CheckArgs),
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing with indicatif layer for progress bar support
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Create indicatif layer for progress bars
    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .with(filter)
        .init();

    // Determine project root
    let project_root = if let Some(ref path) = cli.project {
        camino::Utf8PathBuf::from(path)
    } else {
        std::env::current_dir()
            .ok()
            .and_then(|p| camino::Utf8PathBuf::try_from(p).ok())
            .unwrap_or_else(|| camino::Utf8PathBuf::from("."))
    };

    match cli.command {
        Commands::Init(args) => commands::init::run(&project_root, args)?,
        Commands::Build(args) => commands::build::run(&project_root, args)?,
        Commands::Run(args) => return commands::run::run(&project_root, args),
        Commands::Check(args) => commands::check::run(&project_root, args)?,
    }
    Ok(ExitCode::SUCCESS)
}
