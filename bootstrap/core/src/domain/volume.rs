// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Volume and Mount Entry Types
//!
//! A workspace container mounts exactly two logical volumes:
//!
//! | Volume | Bucket | Purpose |
//! |--------|--------|---------|
//! | `private` | the workspace user's bucket | per-tenant files |
//! | `common` | `common` | shared, read-mostly assets |
//!
//! Each volume becomes one [`MountEntry`] at boot. The [`MountBackend`] trait
//! abstracts the user-space filesystem bridge that performs the mount.

use crate::domain::credential::{CredentialVariant, StorageCredential};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeKind {
    Private,
    Common,
}

impl VolumeKind {
    pub const ALL: [VolumeKind; 2] = [VolumeKind::Private, VolumeKind::Common];

    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeKind::Private => "private",
            VolumeKind::Common => "common",
        }
    }
}

impl fmt::Display for VolumeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountStatus {
    Pending,
    Mounted,
    Failed(String),
}

/// One logical volume of this container instance.
#[derive(Debug, Clone)]
pub struct MountEntry {
    pub volume: VolumeKind,
    pub bucket: String,
    pub local_path: PathBuf,
    /// Variant of the credential used for the mount attempt, if one was made
    pub credential: Option<CredentialVariant>,
    pub status: MountStatus,
}

impl MountEntry {
    pub fn new(volume: VolumeKind, bucket: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            volume,
            bucket: bucket.into(),
            local_path: local_path.into(),
            credential: None,
            status: MountStatus::Pending,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.status == MountStatus::Mounted
    }

    pub fn mark_mounted(&mut self, credential: Option<CredentialVariant>) {
        self.credential = credential;
        self.status = MountStatus::Mounted;
    }

    pub fn mark_failed(&mut self, credential: Option<CredentialVariant>, reason: impl Into<String>) {
        self.credential = credential;
        self.status = MountStatus::Failed(reason.into());
    }
}

/// Ownership applied to every mountpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountOwner {
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Error)]
pub enum MountError {
    #[error("Mount program not found: {0}")]
    ProgramNotFound(String),

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to prepare mountpoint {path}: {source}")]
    Mountpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read mount table: {0}")]
    MountTable(std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// User-space filesystem bridge.
#[async_trait]
pub trait MountBackend: Send + Sync {
    /// Fails with [`MountError::ProgramNotFound`] when the bridge is not installed.
    async fn check_available(&self) -> Result<(), MountError>;

    /// Whether `path` is currently a mountpoint.
    async fn is_mounted(&self, path: &Path) -> Result<bool, MountError>;

    /// Mount `entry.bucket` at `entry.local_path`, owned by `owner`.
    async fn mount(
        &self,
        entry: &MountEntry,
        owner: MountOwner,
        credential: &StorageCredential,
    ) -> Result<(), MountError>;

    async fn unmount(&self, path: &Path) -> Result<(), MountError>;
}
