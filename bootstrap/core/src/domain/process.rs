// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Managed Process Domain
//!
//! Per-daemon lifecycle tracked by the supervisor:
//!
//! ```text
//! NotStarted ──launch──▶ Running ──probe fails──▶ Crashed
//!                           ▲                        │
//!                           └──────relaunch──────────┘
//!             Running / Crashed ──shutdown──▶ Stopped
//! ```
//!
//! The roster is keyed by [`ServiceKind`] rather than by name, so every key
//! that can reach the restart queue has a launcher by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::volume::VolumeKind;

/// Daemons supervised inside a workspace container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    ReverseProxy,
    Notebook,
    Editor,
    StorageSync(VolumeKind),
}

impl ServiceKind {
    /// The reverse proxy forks workers that would orphan if only the master
    /// pid were signalled.
    pub fn signals_process_group(&self) -> bool {
        matches!(self, ServiceKind::ReverseProxy)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::ReverseProxy => write!(f, "reverse-proxy"),
            ServiceKind::Notebook => write!(f, "notebook"),
            ServiceKind::Editor => write!(f, "editor"),
            ServiceKind::StorageSync(volume) => write!(f, "storage-sync-{}", volume),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessState {
    NotStarted,
    Running,
    Crashed,
    Stopped,
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to launch {service}: {reason}")]
    LaunchFailed { service: String, reason: String },

    #[error("Failed to signal pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Supervisor loop failed: {0}")]
    Loop(String),
}

/// Structured handle to a running OS process.
pub trait ProcessHandle: Send {
    fn pid(&self) -> u32;

    /// Process group id; equals `pid` for group leaders.
    fn pgid(&self) -> u32;

    /// Non-blocking existence probe. Reaps the child if it has exited.
    fn is_alive(&mut self) -> bool;

    /// Whether anything that stop signals reach still exists. For handles
    /// that signal a whole process group this includes workers that outlived
    /// the leader.
    fn group_alive(&mut self) -> bool {
        self.is_alive()
    }

    /// Graceful stop (SIGTERM).
    fn terminate(&mut self) -> Result<(), SupervisorError>;

    /// Forced stop (SIGKILL).
    fn kill(&mut self) -> Result<(), SupervisorError>;
}

/// Start function for one roster entry.
///
/// Implementations must be idempotent with respect to their inputs: every
/// relaunch receives the same arguments as the first launch.
pub trait Launcher: Send + Sync {
    fn launch(&self) -> Result<Box<dyn ProcessHandle>, SupervisorError>;
}

/// One supervised daemon.
pub struct ManagedProcess {
    pub kind: ServiceKind,
    pub state: ProcessState,
    pub restart_count: u32,
    pub last_restart: Option<DateTime<Utc>>,
    launcher: Arc<dyn Launcher>,
    handle: Option<Box<dyn ProcessHandle>>,
}

impl ManagedProcess {
    pub fn new(kind: ServiceKind, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            kind,
            state: ProcessState::NotStarted,
            restart_count: 0,
            last_restart: None,
            launcher,
            handle: None,
        }
    }

    /// Pid of the current process; `None` until launched or after a failed launch.
    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(|h| h.pid())
    }

    /// Invoke the start function and adopt the new handle.
    ///
    /// On failure the entry is left `Crashed` so the next sweep retries it.
    pub fn launch(&mut self) -> Result<u32, SupervisorError> {
        match self.launcher.launch() {
            Ok(handle) => {
                let pid = handle.pid();
                self.handle = Some(handle);
                self.state = ProcessState::Running;
                Ok(pid)
            }
            Err(e) => {
                self.handle = None;
                self.state = ProcessState::Crashed;
                Err(e)
            }
        }
    }

    /// Relaunch after a crash, recording the restart.
    pub fn relaunch(&mut self) -> Result<u32, SupervisorError> {
        self.restart_count += 1;
        self.last_restart = Some(Utc::now());
        self.launch()
    }

    /// Liveness probe. A `Running` entry whose probe fails becomes `Crashed`.
    pub fn probe(&mut self) -> bool {
        let alive = self.handle.as_mut().map(|h| h.is_alive()).unwrap_or(false);
        if !alive && self.state == ProcessState::Running {
            self.state = ProcessState::Crashed;
        }
        alive
    }

    /// Like [`probe`](Self::probe), but also true while group members
    /// outlive the leader.
    pub fn members_alive(&mut self) -> bool {
        let leader = self.probe();
        let group = self.handle.as_mut().map(|h| h.group_alive()).unwrap_or(false);
        leader || group
    }

    pub fn handle_mut(&mut self) -> Option<&mut (dyn ProcessHandle + 'static)> {
        self.handle.as_deref_mut()
    }

    pub fn mark_stopped(&mut self) {
        self.state = ProcessState::Stopped;
    }
}

impl fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("pid", &self.pid())
            .field("restart_count", &self.restart_count)
            .field("last_restart", &self.last_restart)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeHandle {
        pid: u32,
        alive: bool,
    }

    impl ProcessHandle for FakeHandle {
        fn pid(&self) -> u32 {
            self.pid
        }
        fn pgid(&self) -> u32 {
            self.pid
        }
        fn is_alive(&mut self) -> bool {
            self.alive
        }
        fn terminate(&mut self) -> Result<(), SupervisorError> {
            self.alive = false;
            Ok(())
        }
        fn kill(&mut self) -> Result<(), SupervisorError> {
            self.alive = false;
            Ok(())
        }
    }

    struct CountingLauncher {
        next_pid: AtomicU32,
    }

    impl Launcher for CountingLauncher {
        fn launch(&self) -> Result<Box<dyn ProcessHandle>, SupervisorError> {
            let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeHandle { pid, alive: true }))
        }
    }

    struct FailingLauncher;

    impl Launcher for FailingLauncher {
        fn launch(&self) -> Result<Box<dyn ProcessHandle>, SupervisorError> {
            Err(SupervisorError::LaunchFailed {
                service: "editor".to_string(),
                reason: "No such file or directory".to_string(),
            })
        }
    }

    #[test]
    fn test_state_machine() {
        let launcher = Arc::new(CountingLauncher { next_pid: AtomicU32::new(100) });
        let mut process = ManagedProcess::new(ServiceKind::Notebook, launcher);
        assert_eq!(process.state, ProcessState::NotStarted);
        assert_eq!(process.pid(), None);

        assert_eq!(process.launch().unwrap(), 100);
        assert_eq!(process.state, ProcessState::Running);
        assert!(process.probe());

        process.handle_mut().unwrap().kill().unwrap();
        assert!(!process.probe());
        assert_eq!(process.state, ProcessState::Crashed);

        assert_eq!(process.relaunch().unwrap(), 101);
        assert_eq!(process.state, ProcessState::Running);
        assert_eq!(process.restart_count, 1);
        assert!(process.last_restart.is_some());

        process.mark_stopped();
        assert_eq!(process.state, ProcessState::Stopped);
    }

    #[test]
    fn test_failed_launch_leaves_entry_crashed() {
        let mut process = ManagedProcess::new(ServiceKind::Editor, Arc::new(FailingLauncher));
        assert!(process.launch().is_err());
        assert_eq!(process.state, ProcessState::Crashed);
        assert_eq!(process.pid(), None);
        assert!(!process.probe());
    }

    #[test]
    fn test_service_kind_display_and_group_policy() {
        assert_eq!(ServiceKind::ReverseProxy.to_string(), "reverse-proxy");
        assert_eq!(
            ServiceKind::StorageSync(VolumeKind::Common).to_string(),
            "storage-sync-common"
        );
        assert!(ServiceKind::ReverseProxy.signals_process_group());
        assert!(!ServiceKind::Notebook.signals_process_group());
    }
}
