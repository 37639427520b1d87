//! Keyed timers CLI
//!
//! Runs the event-time timer scenario against the engine and reports the
//! verdict.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::{ConfigCommand, RunCommand};

#[derive(Parser)]
#[command(
    name = "keyed-timers",
    version,
    about = "Keyed event-time timer and state engine",
    long_about = "Runs keyed elements through the timer engine in bounded or \
                  unbounded mode and checks the output multiset."
)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true, value_name = "FILE", env = "KEYED_TIMERS_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging for the engine
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario
    #[command(name = "run")]
    Run {
        #[command(subcommand)]
        command: RunCommand,
    },

    /// Inspect configuration
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(2);
        }
    }
}

/// Returns `false` when a scenario ran but did not pass
async fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let config = engine::EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { command } => command.execute(config).await,
        Commands::Config { command } => {
            command.execute(&config)?;
            Ok(true)
        }
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_filter = if verbose {
        "engine=debug,keyed_timers=debug,info"
    } else {
        "engine=warn,keyed_timers=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
