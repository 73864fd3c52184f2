// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Default command: the full container boot sequence.

use anyhow::{Context, Result};
use tracing::info;

use bootstrap_core::application::WorkspaceBootstrap;
use bootstrap_core::domain::bootstrap_config::BootstrapConfig;

use crate::signals::shutdown_signal;

pub async fn execute(config: BootstrapConfig) -> Result<()> {
    let shutdown = shutdown_signal()?;
    let bootstrap =
        WorkspaceBootstrap::from_config(config).context("Failed to initialize workspace bootstrap")?;

    bootstrap.run(shutdown).await?;
    info!("Exiting");
    Ok(())
}
