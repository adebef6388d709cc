//! MicroSociety CLI - simulate worlds, collect experience data, train and
//! validate NPC models

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::unused_async)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod service;

use commands::{simulate, train, validate};
use config::AppConfig;

#[derive(Parser)]
#[command(name = "msoc")]
#[command(author, version, about = "MicroSociety - NPC reinforcement learning toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to MSOC_CONFIG, ./msoc.toml, ~/.config/msoc/msoc.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run society worlds, optionally collecting experience data
    Simulate(simulate::SimulateArgs),

    /// Train an agent online against an environment
    Train(train::TrainArgs),

    /// Train a DQN from collected experience data
    TrainOffline(train::TrainOfflineArgs),

    /// Validate a saved model against collected data
    Validate(validate::ValidateArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(commands::config::ConfigCommands),
}

fn init_logging(config: &AppConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("msoc_cli={level},msoc_core={level},msoc_rl={level},msoc_data={level}").into()
    });

    let json_layer = config
        .logging
        .json
        .then(|| tracing_subscriber::fmt::layer().json());
    let text_layer = (!config.logging.json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config, cli.verbose);

    match &config.source {
        Some(path) => debug!(path = %path.display(), "Loaded configuration"),
        None => debug!("No configuration file found, using defaults"),
    }

    match cli.command {
        Commands::Simulate(args) => simulate::run(args, config).await,
        Commands::Train(args) => train::run(args, config).await,
        Commands::TrainOffline(args) => train::run_offline(args, config).await,
        Commands::Validate(args) => validate::run(args).await,
        Commands::Config(cmd) => commands::config::run(cmd, &config).await,
    }
}
