// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Termination signal handling.
//!
//! SIGINT, SIGTERM, SIGHUP and SIGQUIT all mean "shut the container down".
//! Handlers are installed when [`shutdown_signal`] is called, not when the
//! returned future is first polled: as PID 1 the process would otherwise
//! ignore a signal that arrives while storage is still being mounted.

use anyhow::{Context, Result};
use std::future::Future;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::info;

pub fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut interrupt = install(SignalKind::interrupt(), "SIGINT")?;
    let mut terminate = install(SignalKind::terminate(), "SIGTERM")?;
    let mut hangup = install(SignalKind::hangup(), "SIGHUP")?;
    let mut quit = install(SignalKind::quit(), "SIGQUIT")?;

    Ok(async move {
        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = hangup.recv() => "SIGHUP",
            _ = quit.recv() => "SIGQUIT",
        };
        info!(signal = name, "Received termination signal");
    })
}

fn install(kind: SignalKind, name: &str) -> Result<Signal> {
    signal(kind).with_context(|| format!("Failed to install {} handler", name))
}
