// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Workspace Boot Sequence
//!
//! Wires the token broker, mount manager and supervisor from a
//! [`BootstrapConfig`] and runs them in order:
//!
//! 1. resolve a storage credential and mount every volume (errors logged)
//! 2. build the daemon roster and start it, unless shutdown was already
//!    requested during step 1
//! 3. sweep until the shutdown future resolves
//! 4. stop the daemons, then unmount if configured
//!
//! Nothing in the sequence is fatal; [`WorkspaceBootstrap::run`] returns
//! `Ok(())` so the container exits cleanly.

use anyhow::Context;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::application::mount_manager::{MountManager, MountReport};
use crate::application::supervisor::Supervisor;
use crate::application::token_broker::{RetryPolicy, TokenBroker};
use crate::domain::bootstrap_config::{BootstrapConfig, ServiceConfig};
use crate::domain::process::ServiceKind;
use crate::domain::volume::MountBackend;
use crate::infrastructure::{CommandLauncher, KeycloakClient, MinioStsClient, S3fsMounter};

pub struct WorkspaceBootstrap {
    config: BootstrapConfig,
    broker: TokenBroker,
    mounts: MountManager,
}

impl WorkspaceBootstrap {
    /// Production wiring: Keycloak, MinIO STS and s3fs.
    pub fn from_config(config: BootstrapConfig) -> anyhow::Result<Self> {
        let spec = &config.spec;
        let timeout = spec.retry.request_timeout;

        let identity = KeycloakClient::new(&spec.identity, timeout)
            .context("Failed to build identity provider client")?;
        let exchange = MinioStsClient::new(&spec.storage, timeout)
            .context("Failed to build object store client")?;
        let broker = TokenBroker::new(
            Arc::new(identity),
            Arc::new(exchange),
            RetryPolicy::from(&spec.retry),
        )
        .with_owner(config.resource_owner())
        .with_fallback(config.fallback_credential());

        let backend = Arc::new(S3fsMounter::new(&spec.mounts, spec.storage.endpoint.clone()));
        Ok(Self::with_components(config, broker, backend))
    }

    /// Wiring with caller-supplied broker and mount backend.
    pub fn with_components(
        config: BootstrapConfig,
        broker: TokenBroker,
        backend: Arc<dyn MountBackend>,
    ) -> Self {
        let mounts = MountManager::new(backend, config.mount_entries(), config.spec.mounts.owner())
            .with_desktop_dir(config.spec.mounts.desktop_dir());
        Self {
            config,
            broker,
            mounts,
        }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn broker(&self) -> &TokenBroker {
        &self.broker
    }

    pub fn mounts(&self) -> &MountManager {
        &self.mounts
    }

    /// Resolve a credential and mount every volume.
    pub async fn mount(&mut self) -> MountReport {
        if !self.config.spec.mounts.enabled {
            info!("Storage mounting disabled");
            return MountReport::skipped(self.mounts.entries().to_vec(), "mounting disabled");
        }

        let report = self.mounts.mount_all(&self.broker).await;
        if let Some(reason) = &report.skipped {
            warn!("Storage mounting skipped: {}", reason);
        } else {
            info!(
                mounted = report.mounted().count(),
                failed = report.failed().count(),
                credential = ?report.credential,
                "Storage mounting finished"
            );
        }
        report
    }

    pub async fn unmount(&mut self) {
        self.mounts.unmount_all().await;
    }

    /// Roster from the service templates. Storage-sync daemons are only
    /// registered for volumes that are mounted.
    pub fn build_supervisor(&self) -> Supervisor {
        let spec = &self.config.spec;
        let persistent_dir = spec.mounts.persistent_dir.as_path();
        let mut supervisor = Supervisor::from_config(&spec.supervisor);

        for (kind, service) in [
            (ServiceKind::ReverseProxy, &spec.services.reverse_proxy),
            (ServiceKind::Notebook, &spec.services.notebook),
            (ServiceKind::Editor, &spec.services.editor),
        ] {
            if !service.enabled {
                info!(service = %kind, "Service disabled");
                continue;
            }
            supervisor.register(kind, Arc::new(service_launcher(kind, service, persistent_dir)));
        }

        for sync in &spec.services.storage_sync {
            let kind = ServiceKind::StorageSync(sync.volume);
            let Some(entry) = self
                .mounts
                .entries()
                .iter()
                .find(|e| e.volume == sync.volume && e.is_mounted())
            else {
                warn!(service = %kind, "Volume not mounted, storage sync not started");
                continue;
            };
            let launcher = CommandLauncher::new(kind, sync.program.clone(), sync.render_args(persistent_dir, entry))
                .with_env(sync.env.clone());
            supervisor.register(kind, Arc::new(launcher));
        }

        supervisor
    }

    /// Full boot sequence; returns once `shutdown` resolves and cleanup ran.
    pub async fn run<F>(mut self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(name = %self.config.metadata.name, "Starting workspace bootstrap");
        tokio::pin!(shutdown);

        // Readiness polling can take minutes; a stop request must not wait for it
        let interrupted = tokio::select! {
            _ = self.mount() => false,
            _ = &mut shutdown => true,
        };

        if interrupted {
            info!("Shutdown requested during storage mounting, daemons not started");
        } else {
            let mut supervisor = self.build_supervisor();
            if supervisor.is_empty() {
                warn!("No services configured");
            }
            supervisor.start_all();

            if let Err(e) = supervisor.run_until(shutdown.as_mut()).await {
                error!("Supervisor loop failed: {}", e);
            }
            supervisor.shutdown().await;
        }

        if self.config.spec.mounts.enabled && self.config.spec.mounts.unmount_on_exit {
            self.unmount().await;
        }

        info!("Workspace bootstrap finished");
        Ok(())
    }
}

fn service_launcher(kind: ServiceKind, service: &ServiceConfig, persistent_dir: &Path) -> CommandLauncher {
    CommandLauncher::new(kind, service.program.clone(), service.render_args(persistent_dir))
        .with_env(service.env.clone())
        .with_working_dir(service.working_dir.clone())
}
