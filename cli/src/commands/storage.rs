// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! One-shot storage commands
//!
//! Commands: mount, unmount, credentials

use anyhow::{Context, Result};
use colored::Colorize;

use bootstrap_core::application::{MountReport, WorkspaceBootstrap};
use bootstrap_core::domain::bootstrap_config::BootstrapConfig;
use bootstrap_core::domain::credential::{CredentialVariant, StorageCredential};
use bootstrap_core::domain::volume::MountStatus;

pub async fn mount(config: BootstrapConfig) -> Result<()> {
    let mut bootstrap = build(config)?;
    let report = bootstrap.mount().await;
    print_report(&report);
    Ok(())
}

pub async fn unmount(config: BootstrapConfig) -> Result<()> {
    let mut bootstrap = build(config)?;
    bootstrap.unmount().await;

    for entry in bootstrap.mounts().entries() {
        let line = format!("  {} {}", entry.volume, entry.local_path.display());
        if entry.is_mounted() {
            println!("{} {}", "✗".red(), line);
        } else {
            println!("{} {}", "✓".green(), line);
        }
    }
    Ok(())
}

pub async fn credentials(config: BootstrapConfig) -> Result<()> {
    let bootstrap = build(config)?;
    let resolution = bootstrap.broker().resolve_credential().await;

    match &resolution.credential {
        Some(credential) => print_credential(credential),
        None => println!("{}", "No storage credential available".red()),
    }
    if let Some(reason) = &resolution.degraded {
        println!("  Reason: {}", reason.to_string().yellow());
    }
    Ok(())
}

fn build(config: BootstrapConfig) -> Result<WorkspaceBootstrap> {
    WorkspaceBootstrap::from_config(config).context("Failed to initialize workspace bootstrap")
}

fn print_credential(credential: &StorageCredential) {
    let variant = credential.variant();
    let label = match variant {
        CredentialVariant::Delegated => variant.to_string().green(),
        CredentialVariant::Fallback => variant.to_string().yellow(),
    };
    println!("{} {}", "Credential:".bold(), label);
    println!("  Access key: {}", credential.access_key());
    println!("  Secret key: {}", "(redacted)".dimmed());
    if credential.session_token().is_some() {
        println!("  Session token: {}", "(redacted)".dimmed());
    }
    match credential.expires_at() {
        Some(expiry) => println!("  Expires: {}", expiry.to_rfc3339()),
        None => println!("  Expires: {}", "never".dimmed()),
    }
    if variant == CredentialVariant::Fallback {
        println!(
            "  {}",
            "Static credential: storage access is not scoped to the workspace user".yellow()
        );
    }
}

fn print_report(report: &MountReport) {
    if let Some(reason) = &report.skipped {
        println!("{} {}", "Mounting skipped:".yellow(), reason);
        return;
    }

    if let Some(variant) = report.credential {
        println!("{} {}", "Credential:".bold(), variant);
    }
    for entry in &report.entries {
        let line = format!(
            "{} → {}",
            entry.bucket,
            entry.local_path.display()
        );
        match &entry.status {
            MountStatus::Mounted => println!("{} {:<8} {}", "✓".green(), entry.volume.as_str(), line),
            MountStatus::Failed(reason) => {
                println!("{} {:<8} {}", "✗".red(), entry.volume.as_str(), line);
                println!("    {}", reason.dimmed());
            }
            MountStatus::Pending => println!("{} {:<8} {}", "-".dimmed(), entry.volume.as_str(), line),
        }
    }
}
