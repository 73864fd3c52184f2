// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! OS Process Launcher
//!
//! [`CommandLauncher`] is the start function of a roster entry: it spawns the
//! configured program in a fresh process group (pgid == pid) and returns a
//! [`ChildProcess`] handle. Owning the `Child` lets the liveness probe reap
//! exited daemons instead of mistaking zombies for live processes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::os::unix::process::CommandExt;
use tracing::{debug, info};

use crate::domain::process::{Launcher, ProcessHandle, ServiceKind, SupervisorError};

/// Spawns one daemon with fixed arguments.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    kind: ServiceKind,
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl CommandLauncher {
    pub fn new(kind: ServiceKind, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            kind,
            program: program.into(),
            args,
            env: HashMap::new(),
            working_dir: None,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self) -> Result<Box<dyn ProcessHandle>, SupervisorError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .process_group(0);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| SupervisorError::LaunchFailed {
            service: self.kind.to_string(),
            reason: format!("{}: {}", self.program, e),
        })?;

        info!(service = %self.kind, pid = child.id(), program = %self.program, "Launched daemon");
        Ok(Box::new(ChildProcess::new(child, self.kind.signals_process_group())))
    }
}

/// Handle to a spawned process group leader.
pub struct ChildProcess {
    child: Child,
    pgid: u32,
    signal_group: bool,
    exited: bool,
}

impl ChildProcess {
    pub fn new(child: Child, signal_group: bool) -> Self {
        let pgid = child.id();
        Self {
            child,
            pgid,
            signal_group,
            exited: false,
        }
    }

    fn send(&mut self, signal: libc::c_int) -> Result<(), SupervisorError> {
        // Workers of a group may outlive the leader, so groups are signalled
        // even after the leader was reaped.
        if self.exited && !self.signal_group {
            return Ok(());
        }

        let rc = unsafe {
            if self.signal_group {
                libc::killpg(self.pgid as libc::pid_t, signal)
            } else {
                libc::kill(self.child.id() as libc::pid_t, signal)
            }
        };
        if rc == 0 {
            return Ok(());
        }

        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            Ok(())
        } else {
            Err(SupervisorError::Signal {
                pid: self.child.id(),
                source: err,
            })
        }
    }
}

impl ProcessHandle for ChildProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn pgid(&self) -> u32 {
        self.pgid
    }

    fn is_alive(&mut self) -> bool {
        if self.exited {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(pid = self.child.id(), %status, "Child exited");
                self.exited = true;
                false
            }
            Err(_) => unsafe { libc::kill(self.child.id() as libc::pid_t, 0) == 0 },
        }
    }

    fn group_alive(&mut self) -> bool {
        let leader = self.is_alive();
        if !self.signal_group {
            return leader;
        }
        leader || unsafe { libc::killpg(self.pgid as libc::pid_t, 0) == 0 }
    }

    fn terminate(&mut self) -> Result<(), SupervisorError> {
        self.send(libc::SIGTERM)
    }

    fn kill(&mut self) -> Result<(), SupervisorError> {
        self.send(libc::SIGKILL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_for_exit(handle: &mut dyn ProcessHandle) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if !handle.is_alive() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_launch_spawns_group_leader() {
        let launcher = CommandLauncher::new(
            ServiceKind::Notebook,
            "sleep",
            vec!["30".to_string()],
        );
        let mut handle = launcher.launch().unwrap();
        assert!(handle.is_alive());
        assert_eq!(handle.pid(), handle.pgid());
        let pgid = unsafe { libc::getpgid(handle.pid() as libc::pid_t) };
        assert_eq!(pgid as u32, handle.pid());

        handle.terminate().unwrap();
        assert!(wait_for_exit(handle.as_mut()));
        // Signalling an exited process is not an error
        handle.kill().unwrap();
    }

    #[test]
    fn test_group_terminate_reaches_forked_children() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("worker.pid");
        let script = format!("sleep 30 & echo $! > {}; wait", marker.display());
        let launcher = CommandLauncher::new(
            ServiceKind::ReverseProxy,
            "sh",
            vec!["-c".to_string(), script],
        );
        let mut handle = launcher.launch().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let worker_pid = loop {
            if let Ok(raw) = std::fs::read_to_string(&marker) {
                if let Ok(pid) = raw.trim().parse::<i32>() {
                    break pid;
                }
            }
            assert!(Instant::now() < deadline, "worker never started");
            std::thread::sleep(Duration::from_millis(20));
        };

        handle.terminate().unwrap();
        assert!(wait_for_exit(handle.as_mut()));

        let deadline = Instant::now() + Duration::from_secs(5);
        while !process_gone(worker_pid) {
            assert!(Instant::now() < deadline, "worker survived group termination");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    // The worker is reparented and may linger as an unreaped zombie.
    fn process_gone(pid: i32) -> bool {
        if unsafe { libc::kill(pid, 0) } != 0 {
            return true;
        }
        std::fs::read_to_string(format!("/proc/{}/stat", pid))
            .ok()
            .and_then(|stat| {
                stat.rsplit_once(')')
                    .and_then(|(_, rest)| rest.trim_start().chars().next())
            })
            .map(|state| state == 'Z' || state == 'X')
            .unwrap_or(true)
    }

    #[test]
    fn test_launch_failure() {
        let launcher = CommandLauncher::new(
            ServiceKind::Editor,
            "/nonexistent/code-server",
            vec![],
        );
        match launcher.launch() {
            Err(SupervisorError::LaunchFailed { service, .. }) => assert_eq!(service, "editor"),
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("launch should fail"),
        }
    }
}
