mod commands;
mod config;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use glucopeak_core::PipelineConfig;

use crate::commands::{Overrides, cmd_init_config, cmd_participants, cmd_run};

#[derive(Parser)]
#[command(
    name = "glucopeak",
    version,
    about = "Match logged meals to post-meal glucose peaks",
    long_about = "Reads per-participant Dexcom exports and food logs, finds the peak \
glucose in the window after each meal, and writes one analysis table."
)]
struct Cli {
    /// Config file (default: ./glucopeak.toml, then the per-user config)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline and write the output table
    Run {
        #[command(flatten)]
        overrides: Overrides,
        /// Print the rows instead of writing them
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show per-participant input coverage and match counts
    Participants {
        #[command(flatten)]
        overrides: Overrides,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a commented default config file
    InitConfig {
        /// Where to write the config
        #[arg(default_value = config::LOCAL_CONFIG)]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// `RUST_LOG` wins over `-v` when set.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "glucopeak={default_level},glucopeak_core={default_level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            overrides,
            dry_run,
            json,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            overrides.apply(&mut config);
            cmd_run(config, dry_run, json)
        }
        Commands::Participants { overrides, json } => {
            let mut config = load_config(cli.config.as_deref())?;
            overrides.apply(&mut config);
            cmd_participants(config, json)
        }
        Commands::InitConfig { path, force, json } => cmd_init_config(&path, force, json),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    let (config, source) = config::load(explicit)?;
    debug!("Using configuration from {}", source.describe());
    Ok(config)
}
