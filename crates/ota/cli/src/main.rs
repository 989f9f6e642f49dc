//! otactl - drive the OTA updater from a terminal
//!
//! Read-only one-shots (`list`, `current`, `device-id`) inspect persisted
//! state. `session` plays the host shell: it performs the cold-start health
//! check and then reads lifecycle commands from stdin.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ota_core::{LocalFileFetcher, Updater, UpdaterConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod output;
mod session;

use output::OutputFormat;

/// otactl CLI
#[derive(Parser)]
#[command(name = "otactl")]
#[command(about = "Rollback-safe OTA bundle updater", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "OTA_CONFIG")]
    config: Option<String>,

    /// Storage root, overrides the configuration file
    #[arg(long, env = "OTA_ROOT")]
    root: Option<std::path::PathBuf>,

    /// Log level
    #[arg(long, env = "OTA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "OTA_LOG_JSON")]
    json: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// List known bundles, builtin included
    List,

    /// Show the active bundle and the native version
    Current,

    /// Print the persistent device identifier
    DeviceId,

    /// Run a host session reading commands from stdin
    Session {
        /// Print every emitted event to stderr
        #[arg(long)]
        events: bool,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = UpdaterConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(root) = cli.root.clone() {
        config.storage.root_dir = root;
    }
    if let Some(level) = cli.log_level.clone() {
        config.logging.level = level;
    }
    let json_logs = cli.json || config.logging.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if let Commands::Config = cli.command {
        return output::print_single(&config, OutputFormat::Json);
    }

    let updater = Updater::open(config, Arc::new(LocalFileFetcher::new()))
        .await
        .context("opening updater")?;

    match cli.command {
        Commands::List => output::print_versions(&updater.list(), cli.output),
        Commands::Current => output::print_single(&updater.current()?, cli.output),
        Commands::DeviceId => output::print_single(
            &serde_json::json!({ "id": updater.get_id()? }),
            cli.output,
        ),
        Commands::Session { events } => {
            if events {
                let mut stream = updater.events().stream();
                tokio::spawn(async move {
                    loop {
                        match stream.recv().await {
                            Ok(event) => {
                                if let Ok(line) = serde_json::to_string(&event) {
                                    eprintln!("event {}", line);
                                }
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                eprintln!("event stream lagged, {} skipped", skipped)
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                });
            }
            session::run(&updater, cli.output).await
        }
        Commands::Config => Ok(()),
    }
}
