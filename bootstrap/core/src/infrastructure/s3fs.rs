// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! s3fs-fuse Mount Backend
//!
//! Implements [`MountBackend`] by shelling out to `s3fs`, which exposes an
//! S3-compatible bucket as a FUSE filesystem. Access control stays with the
//! object store: s3fs translates filesystem operations into S3 calls signed
//! with whatever credential it was handed.
//!
//! Credentials travel through the child's environment
//! (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN`) so they
//! never appear in the process table or in logged command lines.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::bootstrap_config::MountsConfig;
use crate::domain::credential::StorageCredential;
use crate::domain::volume::{MountBackend, MountEntry, MountError, MountOwner};
use crate::infrastructure::mount_table::MountTable;

pub struct S3fsMounter {
    program: String,
    endpoint: String,
    extra_options: Vec<String>,
    mount_table: MountTable,
}

impl S3fsMounter {
    pub fn new(config: &MountsConfig, endpoint: impl Into<String>) -> Self {
        Self {
            program: config.program.clone(),
            endpoint: endpoint.into(),
            extra_options: config.extra_options.clone(),
            mount_table: MountTable::new(&config.mount_table),
        }
    }

    /// Command line for one volume, without credentials.
    pub fn build_args(&self, entry: &MountEntry, owner: MountOwner) -> Vec<String> {
        let mut options = vec![
            format!("url={}", self.endpoint),
            "use_path_request_style".to_string(),
            format!("uid={}", owner.uid),
            format!("gid={}", owner.gid),
            "allow_other".to_string(),
            "umask=0022".to_string(),
            "mp_umask=0022".to_string(),
        ];
        options.extend(self.extra_options.iter().cloned());

        let mut args = vec![
            entry.bucket.clone(),
            entry.local_path.display().to_string(),
        ];
        for option in options {
            args.push("-o".to_string());
            args.push(option);
        }
        args
    }

    fn resolve_program(&self) -> Result<PathBuf, MountError> {
        which::which(&self.program).map_err(|_| MountError::ProgramNotFound(self.program.clone()))
    }
}

#[async_trait]
impl MountBackend for S3fsMounter {
    async fn check_available(&self) -> Result<(), MountError> {
        self.resolve_program().map(|_| ())
    }

    async fn is_mounted(&self, path: &Path) -> Result<bool, MountError> {
        self.mount_table
            .contains(path)
            .await
            .map_err(MountError::MountTable)
    }

    async fn mount(
        &self,
        entry: &MountEntry,
        owner: MountOwner,
        credential: &StorageCredential,
    ) -> Result<(), MountError> {
        prepare_mountpoint(&entry.local_path, owner).await?;

        let program = self.resolve_program()?;
        let args = self.build_args(entry, owner);
        let command_line = format!("{} {}", self.program, args.join(" "));
        debug!(command = %command_line, "Running mount command");

        let output = Command::new(&program)
            .args(&args)
            .env_remove("AWS_SESSION_TOKEN")
            .envs(credential.to_env())
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(MountError::CommandFailed {
                command: command_line,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn unmount(&self, path: &Path) -> Result<(), MountError> {
        let target = path.display().to_string();
        let attempts: [(&str, Vec<&str>); 2] = [
            ("fusermount", vec!["-u", target.as_str()]),
            ("umount", vec![target.as_str()]),
        ];

        let mut last_error = None;
        for (program, args) in attempts {
            match Command::new(program).args(&args).output().await {
                Ok(output) if output.status.success() => return Ok(()),
                Ok(output) => {
                    last_error = Some(MountError::CommandFailed {
                        command: format!("{} {}", program, args.join(" ")),
                        status: output.status.to_string(),
                        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    });
                }
                Err(e) => last_error = Some(MountError::Io(e)),
            }
        }

        Err(last_error.unwrap_or_else(|| MountError::ProgramNotFound("umount".to_string())))
    }
}

/// Create the mountpoint and hand it to the runtime user.
///
/// A failed chown is only logged: the bridge's `uid`/`gid` options decide the
/// ownership seen through the mount.
async fn prepare_mountpoint(path: &Path, owner: MountOwner) -> Result<(), MountError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| MountError::Mountpoint {
            path: path.to_path_buf(),
            source,
        })?;

    if let Err(e) = std::os::unix::fs::chown(path, Some(owner.uid), Some(owner.gid)) {
        warn!(path = %path.display(), uid = owner.uid, gid = owner.gid, "Failed to chown mountpoint: {}", e);
    }
    Ok(())
}
