// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use bootstrap_core::domain::bootstrap_config::{BootstrapConfig, ServiceConfig, CONFIG_PATH_ENV};

pub const MINIMAL_TEMPLATE: &str = include_str!("../../templates/bootstrap-minimal.yaml");
pub const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/bootstrap-with-examples.yaml");

const REDACTED: &str = "(redacted)";

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML (secrets redacted)
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./workspace-bootstrap.yaml)
        #[arg(short, long, default_value = "./workspace-bootstrap.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./workspace-bootstrap.yaml");
        println!("  4. ~/.workspace/bootstrap.yaml");
        println!("  5. /etc/workspace/bootstrap.yaml");
        match BootstrapConfig::discover_config() {
            Some(found) => println!("  Discovered: {}", found.display().to_string().green()),
            None => println!("  Discovered: {}", "(none, using defaults)".dimmed()),
        }
        println!();
    }

    let config = BootstrapConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;

    if as_yaml {
        let yaml = serde_yaml::to_string(&redacted(config))
            .context("Failed to serialize configuration")?;
        print!("{}", yaml);
        return Ok(());
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Identity Provider:".bold());
    println!("  Issuer: {}", spec.identity.issuer_url);
    println!("  Realm: {}", spec.identity.realm);
    println!("  Client: {}", spec.identity.client_id);
    if spec.identity.username.is_empty() {
        println!("  User: {}", "(not set)".yellow());
    } else {
        println!("  User: {}", spec.identity.username);
    }
    println!(
        "  Password: {}",
        if config.resource_owner().is_some() { "set".green() } else { "(not set)".yellow() }
    );
    println!();

    println!("{}", "Object Store:".bold());
    println!("  Endpoint: {}", spec.storage.endpoint);
    println!("  Session duration: {}s", spec.storage.duration_seconds);
    println!(
        "  Fallback credential: {}",
        if config.fallback_credential().is_some() { "set".yellow() } else { "(none)".dimmed() }
    );
    println!(
        "  Readiness: {} attempts, {:?} apart",
        spec.retry.attempts, spec.retry.delay
    );
    println!();

    println!("{}", "Mounts:".bold());
    if !spec.mounts.enabled {
        println!("  {}", "disabled".dimmed());
    }
    println!("  Program: {}", spec.mounts.program);
    println!("  Owner: {}:{}", spec.mounts.uid, spec.mounts.gid);
    for entry in config.mount_entries() {
        println!("  {} {} → {}", entry.volume.to_string().bold(), entry.bucket, entry.local_path.display());
    }
    println!();

    println!("{}", "Services:".bold());
    for (name, service) in [
        ("reverse-proxy", &spec.services.reverse_proxy),
        ("notebook", &spec.services.notebook),
        ("editor", &spec.services.editor),
    ] {
        print_service(name, service, &config);
    }
    for sync in &spec.services.storage_sync {
        println!("  storage-sync-{}: {}", sync.volume, sync.program);
    }
    println!(
        "  Sweep every {:?}, shutdown grace {:?}",
        spec.supervisor.sweep_interval, spec.supervisor.shutdown_grace
    );
    println!();

    Ok(())
}

fn print_service(name: &str, service: &ServiceConfig, config: &BootstrapConfig) {
    if !service.enabled {
        println!("  {}: {}", name, "disabled".dimmed());
        return;
    }
    let args = service.render_args(&config.spec.mounts.persistent_dir);
    println!("  {}: {} {}", name.bold(), service.program, args.join(" "));
}

/// Copy of `config` safe to print.
fn redacted(mut config: BootstrapConfig) -> BootstrapConfig {
    let identity = &mut config.spec.identity;
    if identity.password.is_some() {
        identity.password = Some(REDACTED.to_string());
    }
    if identity.client_secret.is_some() {
        identity.client_secret = Some(REDACTED.to_string());
    }
    if let Some(fallback) = config.spec.storage.fallback.as_mut() {
        fallback.secret_key = REDACTED.to_string();
    }
    config
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = BootstrapConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    if config.resource_owner().is_none() {
        println!(
            "{}",
            "! No workspace username/password: delegated credentials cannot be obtained".yellow()
        );
    }

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
