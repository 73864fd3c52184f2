// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Storage Mount Manager Application Service
//!
//! Mounts every configured volume through the [`MountBackend`] using the
//! credential resolved by the token broker. Volumes are attempted
//! independently and nothing here aborts the boot sequence: the worst
//! outcome is a [`MountReport`] full of failed entries.
//!
//! Re-running is safe. Paths already present in the mount table are adopted
//! rather than remounted, and existing desktop shortcuts are left alone.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::application::token_broker::TokenBroker;
use crate::domain::credential::{CredentialVariant, StorageCredential};
use crate::domain::volume::{MountBackend, MountEntry, MountError, MountOwner, MountStatus};

/// Result of one mount pass.
#[derive(Debug, Clone)]
pub struct MountReport {
    pub entries: Vec<MountEntry>,
    pub credential: Option<CredentialVariant>,
    /// Set when the whole pass was skipped
    pub skipped: Option<String>,
}

impl MountReport {
    pub fn skipped(entries: Vec<MountEntry>, reason: impl Into<String>) -> Self {
        Self {
            entries,
            credential: None,
            skipped: Some(reason.into()),
        }
    }

    pub fn mounted(&self) -> impl Iterator<Item = &MountEntry> {
        self.entries.iter().filter(|e| e.is_mounted())
    }

    pub fn failed(&self) -> impl Iterator<Item = &MountEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, MountStatus::Failed(_)))
    }
}

pub struct MountManager {
    backend: Arc<dyn MountBackend>,
    entries: Vec<MountEntry>,
    owner: MountOwner,
    desktop_dir: Option<PathBuf>,
}

impl MountManager {
    pub fn new(backend: Arc<dyn MountBackend>, entries: Vec<MountEntry>, owner: MountOwner) -> Self {
        Self {
            backend,
            entries,
            owner,
            desktop_dir: None,
        }
    }

    /// Directory receiving one shortcut symlink per mounted volume.
    pub fn with_desktop_dir(mut self, desktop_dir: Option<PathBuf>) -> Self {
        self.desktop_dir = desktop_dir;
        self
    }

    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    /// Resolve a credential through `broker`, then mount every volume.
    pub async fn mount_all(&mut self, broker: &TokenBroker) -> MountReport {
        let resolution = broker.resolve_credential().await;
        self.mount_volumes(resolution.credential.as_ref()).await
    }

    /// Mount every volume with `credential`.
    pub async fn mount_volumes(&mut self, credential: Option<&StorageCredential>) -> MountReport {
        let Some(credential) = credential else {
            error!("No storage credential available, skipping storage mounting");
            return MountReport::skipped(self.entries.clone(), "no storage credential available");
        };

        if let Err(e) = self.backend.check_available().await {
            match e {
                MountError::ProgramNotFound(program) => {
                    warn!(program = %program, "Mount program not found, skipping storage mounting");
                }
                other => warn!("Mount backend unavailable, skipping storage mounting: {}", other),
            }
            return MountReport::skipped(self.entries.clone(), "mount program not available");
        }

        let variant = credential.variant();
        for entry in self.entries.iter_mut() {
            match self.backend.is_mounted(&entry.local_path).await {
                Ok(true) => {
                    info!(
                        volume = %entry.volume,
                        path = %entry.local_path.display(),
                        "Volume already mounted"
                    );
                    let previous = entry.credential;
                    entry.mark_mounted(previous);
                    continue;
                }
                Ok(false) => {}
                Err(e) => warn!(path = %entry.local_path.display(), "Could not check mount table: {}", e),
            }

            match self.backend.mount(entry, self.owner, credential).await {
                Ok(()) => {
                    info!(
                        volume = %entry.volume,
                        bucket = %entry.bucket,
                        path = %entry.local_path.display(),
                        credential = %variant,
                        "Mounted volume"
                    );
                    entry.mark_mounted(Some(variant));
                }
                Err(e) => {
                    error!(
                        volume = %entry.volume,
                        bucket = %entry.bucket,
                        path = %entry.local_path.display(),
                        "Failed to mount volume: {}",
                        e
                    );
                    entry.mark_failed(Some(variant), e.to_string());
                }
            }
        }

        self.create_shortcuts().await;

        MountReport {
            entries: self.entries.clone(),
            credential: Some(variant),
            skipped: None,
        }
    }

    /// Best-effort unmount of every volume that is mounted.
    pub async fn unmount_all(&mut self) {
        for entry in self.entries.iter_mut() {
            let mounted = entry.is_mounted()
                || self
                    .backend
                    .is_mounted(&entry.local_path)
                    .await
                    .unwrap_or(false);
            if !mounted {
                continue;
            }

            match self.backend.unmount(&entry.local_path).await {
                Ok(()) => {
                    info!(volume = %entry.volume, path = %entry.local_path.display(), "Unmounted volume");
                    entry.status = MountStatus::Pending;
                }
                Err(e) => {
                    warn!(volume = %entry.volume, path = %entry.local_path.display(), "Failed to unmount volume: {}", e);
                }
            }
        }
    }

    async fn create_shortcuts(&self) {
        let Some(desktop_dir) = &self.desktop_dir else {
            return;
        };

        for entry in self.entries.iter().filter(|e| e.is_mounted()) {
            let link = desktop_dir.join(entry.volume.as_str());
            if let Err(e) = create_shortcut(desktop_dir, &link, &entry.local_path).await {
                warn!(link = %link.display(), target = %entry.local_path.display(), "Failed to create desktop shortcut: {}", e);
            }
        }
    }
}

async fn create_shortcut(desktop_dir: &Path, link: &Path, target: &Path) -> std::io::Result<()> {
    // Anything already at the link path is left untouched, dangling links included
    if tokio::fs::symlink_metadata(link).await.is_ok() {
        debug!(link = %link.display(), "Desktop shortcut already exists");
        return Ok(());
    }
    tokio::fs::create_dir_all(desktop_dir).await?;
    tokio::fs::symlink(target, link).await?;
    debug!(link = %link.display(), target = %target.display(), "Created desktop shortcut");
    Ok(())
}
