// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! # Service Supervisor
//!
//! Owns the daemon roster of a workspace container and keeps it running.
//!
//! ## Loop
//! | Event | Action |
//! |-------|--------|
//! | sweep tick | probe every entry, relaunch the dead ones immediately |
//! | shutdown future resolves | SIGTERM reverse-proxy group, then every other daemon |
//! | grace period elapsed | SIGKILL survivors and the reverse-proxy group, mark every entry `Stopped` |
//!
//! Restarts are neither delayed nor capped. Every restart is logged with its
//! running count so a crash loop is visible in the container log.
//!
//! The supervisor is single-owner state (`&mut self` everywhere); concurrency
//! only exists between the supervised OS processes themselves.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::domain::bootstrap_config::SupervisorConfig;
use crate::domain::process::{
    Launcher, ManagedProcess, ProcessState, ServiceKind, SupervisorError,
};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct Supervisor {
    roster: BTreeMap<ServiceKind, ManagedProcess>,
    sweep_interval: Duration,
    shutdown_grace: Duration,
    /// Set by `start_all`, cleared on entry to `shutdown`
    armed: bool,
}

impl Supervisor {
    pub fn new(sweep_interval: Duration, shutdown_grace: Duration) -> Self {
        Self {
            roster: BTreeMap::new(),
            sweep_interval,
            shutdown_grace,
            armed: false,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(config.sweep_interval, config.shutdown_grace)
    }

    /// Add a roster entry. The roster is fixed once `start_all` runs.
    pub fn register(&mut self, kind: ServiceKind, launcher: Arc<dyn Launcher>) {
        if self.armed {
            warn!(service = %kind, "Ignoring registration after supervisor start");
            return;
        }
        if self
            .roster
            .insert(kind, ManagedProcess::new(kind, launcher))
            .is_some()
        {
            warn!(service = %kind, "Replaced duplicate roster entry");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    pub fn len(&self) -> usize {
        self.roster.len()
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn roster(&self) -> impl Iterator<Item = &ManagedProcess> {
        self.roster.values()
    }

    pub fn get(&self, kind: ServiceKind) -> Option<&ManagedProcess> {
        self.roster.get(&kind)
    }

    pub fn pid(&self, kind: ServiceKind) -> Option<u32> {
        self.roster.get(&kind).and_then(|p| p.pid())
    }

    /// Launch every registered daemon. Launch failures leave the entry
    /// crashed for the next sweep to retry.
    pub fn start_all(&mut self) {
        self.armed = true;
        for (kind, process) in self.roster.iter_mut() {
            if process.state != ProcessState::NotStarted {
                continue;
            }
            if let Err(e) = process.launch() {
                error!(service = %kind, "Failed to start daemon: {}", e);
            }
        }
        info!(services = self.roster.len(), "Supervisor started");
    }

    /// One liveness pass. Returns the kinds that were relaunched.
    pub fn sweep(&mut self) -> Vec<ServiceKind> {
        let queue: Vec<ServiceKind> = self
            .roster
            .iter_mut()
            .filter(|(_, p)| matches!(p.state, ProcessState::Running | ProcessState::Crashed))
            .filter_map(|(kind, p)| (!p.probe()).then_some(*kind))
            .collect();

        let mut restarted = Vec::with_capacity(queue.len());
        for kind in queue {
            if self.restart(kind).is_some() {
                restarted.push(kind);
            }
        }
        restarted
    }

    /// Relaunch one daemon through its start function.
    pub fn restart(&mut self, kind: ServiceKind) -> Option<u32> {
        let Some(process) = self.roster.get_mut(&kind) else {
            error!(service = %kind, "Restart requested for a service with no roster entry, ignoring");
            return None;
        };

        let previous = process.pid();
        match process.relaunch() {
            Ok(pid) => {
                warn!(
                    service = %kind,
                    previous_pid = ?previous,
                    pid,
                    restart_count = process.restart_count,
                    "Daemon died, restarted"
                );
                Some(pid)
            }
            Err(e) => {
                error!(
                    service = %kind,
                    restart_count = process.restart_count,
                    "Failed to restart daemon: {}",
                    e
                );
                None
            }
        }
    }

    /// Sweep at a fixed interval until `shutdown` resolves.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), SupervisorError>
    where
        F: Future<Output = ()>,
    {
        if self.sweep_interval.is_zero() {
            return Err(SupervisorError::Loop(
                "sweep interval must be non-zero".to_string(),
            ));
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.sweep_interval) => {
                    let restarted = self.sweep();
                    if !restarted.is_empty() {
                        debug!(?restarted, "Sweep restarted daemons");
                    }
                }
            }
        }
    }

    /// Stop every daemon: SIGTERM, wait for the grace period, SIGKILL.
    ///
    /// Only the first call does anything.
    pub async fn shutdown(&mut self) {
        if !std::mem::replace(&mut self.armed, false) {
            return;
        }
        info!("Stopping supervised daemons");

        if let Some(proxy) = self.roster.get_mut(&ServiceKind::ReverseProxy) {
            terminate(proxy);
        }
        for (kind, process) in self.roster.iter_mut() {
            if *kind != ServiceKind::ReverseProxy {
                terminate(process);
            }
        }

        let deadline = Instant::now() + self.shutdown_grace;
        while self.any_alive() && Instant::now() < deadline {
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }

        for (kind, process) in self.roster.iter_mut() {
            let alive = process.members_alive();
            if alive {
                warn!(service = %kind, pid = ?process.pid(), "Daemon ignored SIGTERM, killing");
            }
            // Group kill regardless of the leader, which may have exited first
            if alive || kind.signals_process_group() {
                kill(process);
            }
            process.mark_stopped();
        }
        info!("All daemons stopped");
    }

    fn any_alive(&mut self) -> bool {
        // Probe every entry so exited children get reaped
        self.roster
            .values_mut()
            .fold(false, |alive, p| p.members_alive() | alive)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if !std::mem::replace(&mut self.armed, false) {
            return;
        }
        warn!("Supervisor dropped while running, killing daemons");
        for process in self.roster.values_mut() {
            kill(process);
            process.mark_stopped();
        }
    }
}

fn terminate(process: &mut ManagedProcess) {
    let kind = process.kind;
    if let Some(handle) = process.handle_mut() {
        if let Err(e) = handle.terminate() {
            warn!(service = %kind, "Failed to send SIGTERM: {}", e);
        }
    }
}

fn kill(process: &mut ManagedProcess) {
    let kind = process.kind;
    if let Some(handle) = process.handle_mut() {
        if let Err(e) = handle.kill() {
            warn!(service = %kind, "Failed to send SIGKILL: {}", e);
        }
    }
}
