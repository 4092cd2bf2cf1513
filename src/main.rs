use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
#[allow(unused_imports)]
use tracing::*;
use tracing_subscriber::prelude::*;

mod config;
mod errors;
mod fetch;
mod healthcheck;
mod ledger;
mod manager;
mod model;
mod registry;
mod run;
mod sources;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write due balance assertions to the ledger.
    Run(run::Command),
    /// Fetch a single token balance and print it.
    Fetch(fetch::Command),
}

fn main() -> Result<()> {
    fn get_rust_log() -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into())
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(get_rust_log()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let code = match &cli.command {
        Some(Commands::Run(cmd)) => run::execute_command(&cli.config, cmd)?,
        Some(Commands::Fetch(cmd)) => fetch::execute_command(&cli.config, cmd)?,
        None => run::execute_command(&cli.config, &run::Command::default())?,
    };

    std::process::exit(code);
}
