// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! # Workspace Init
//!
//! The `workspace-init` binary is the entrypoint of a workspace container.
//!
//! ## Commands
//!
//! - `workspace-init [run]` - Mount storage, supervise daemons until signalled
//! - `workspace-init mount|unmount` - One-shot storage operations
//! - `workspace-init credentials` - Show which storage credential resolves
//! - `workspace-init config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{debug, warn};

use bootstrap_core::domain::bootstrap_config::BootstrapConfig;
use workspace_bootstrap::commands::{self, ConfigCommand};

/// Workspace Init - storage mounts and daemon supervision for workspace containers
#[derive(Parser)]
#[command(name = "workspace-init")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "WORKSPACE_BOOTSTRAP_CONFIG",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Default: from config
    #[arg(long, global = true, env = "WORKSPACE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format. Default: from config
    #[arg(long, global = true, env = "WORKSPACE_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount storage and supervise the workspace daemons (default)
    #[command(name = "run")]
    Run,

    /// Resolve credentials and mount every volume, then exit
    #[command(name = "mount")]
    Mount,

    /// Unmount every configured volume
    #[command(name = "unmount")]
    Unmount,

    /// Resolve credentials and report which variant was obtained
    #[command(name = "credentials")]
    Credentials,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn from_config(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "text" | "compact" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is normal
    let dotenv = dotenvy::dotenv().ok();

    let Cli {
        config,
        log_level,
        log_format,
        command,
    } = Cli::parse();

    match command.unwrap_or(Commands::Run) {
        Commands::Config { command } => {
            init_logging(
                log_level.as_deref().unwrap_or("info"),
                log_format.unwrap_or(LogFormat::Text),
            )?;
            commands::config::handle_command(command, config).await
        }
        command => {
            let bootstrap_config = BootstrapConfig::load_or_default(config)
                .context("Failed to load configuration")?;
            let level = log_level.unwrap_or_else(|| bootstrap_config.spec.logging.level.clone());
            let configured = &bootstrap_config.spec.logging.format;
            let parsed = log_format.or_else(|| LogFormat::from_config(configured));
            init_logging(&level, parsed.unwrap_or(LogFormat::Text))?;
            if parsed.is_none() {
                warn!("Invalid logging.format '{}'. Expected 'text' or 'json', using text", configured);
            }
            if let Some(path) = dotenv {
                debug!("Loaded environment from {:?}", path);
            }

            bootstrap_config
                .validate()
                .context("Configuration validation failed")?;

            match command {
                Commands::Mount => commands::storage::mount(bootstrap_config).await,
                Commands::Unmount => commands::storage::unmount(bootstrap_config).await,
                Commands::Credentials => commands::storage::credentials(bootstrap_config).await,
                _ => commands::run::execute(bootstrap_config).await,
            }
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
