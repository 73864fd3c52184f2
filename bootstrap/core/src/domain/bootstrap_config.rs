// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

// Workspace Bootstrap Configuration
//
// Defines the configuration schema for the container init, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Identity provider and object store endpoints
// - Retry budget for credential acquisition
// - Volume mounts and the filesystem bridge
// - The fixed daemon roster and supervisor timings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::credential::FallbackCredential;
use crate::domain::identity::ResourceOwner;
use crate::domain::volume::{MountEntry, MountOwner, VolumeKind};

pub const API_VERSION: &str = "workspace.dtaas/v1";
pub const KIND: &str = "WorkspaceBootstrap";
pub const CONFIG_PATH_ENV: &str = "WORKSPACE_BOOTSTRAP_CONFIG";

/// Top-level Kubernetes-style bootstrap manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// API version (must be "workspace.dtaas/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "WorkspaceBootstrap")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: BootstrapSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Workspace instance name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapSpec {
    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub mounts: MountsConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Identity provider base URL (e.g. "http://keycloak:8080")
    #[serde(default = "default_issuer_url")]
    pub issuer_url: String,

    #[serde(default = "default_realm")]
    pub realm: String,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Supports "env:VAR_NAME"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Resource-owner username; also the private bucket name
    #[serde(default)]
    pub username: String,

    /// Supports "env:VAR_NAME"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default = "default_scope")]
    pub scope: String,

    /// Readiness path relative to `issuer_url`.
    /// Default: the realm's OpenID discovery document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Object store endpoint (e.g. "http://minio:9000")
    #[serde(default = "default_storage_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_storage_readiness_path")]
    pub readiness_path: String,

    /// Requested lifetime of delegated credentials
    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: u64,

    /// Static admin credential used when the exchange fails.
    /// Both keys support "env:VAR_NAME"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackCredential>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Readiness attempts per service
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub delay: Duration,

    /// Per-request timeout for every HTTP call
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Persistent storage base; volumes mount at `{persistent_dir}/{volume}`
    #[serde(default = "default_persistent_dir")]
    pub persistent_dir: PathBuf,

    /// Non-root runtime user owning the mountpoints
    #[serde(default = "default_uid")]
    pub uid: u32,

    #[serde(default = "default_uid")]
    pub gid: u32,

    /// Where desktop shortcuts are created. Default: the user's XDG desktop
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desktop_dir: Option<PathBuf>,

    /// Filesystem bridge executable
    #[serde(default = "default_mount_program")]
    pub program: String,

    /// Extra `-o` options passed to the bridge
    #[serde(default)]
    pub extra_options: Vec<String>,

    /// Unmount volumes after the supervisor stops
    #[serde(default = "default_true")]
    pub unmount_on_exit: bool,

    #[serde(default = "default_mount_table")]
    pub mount_table: PathBuf,

    #[serde(default = "default_volumes")]
    pub volumes: Vec<VolumeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub volume: VolumeKind,

    /// Default: the username for `private`, "common" for `common`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// Default: `{persistent_dir}/{volume}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_reverse_proxy")]
    pub reverse_proxy: ServiceConfig,

    #[serde(default = "default_notebook")]
    pub notebook: ServiceConfig,

    #[serde(default = "default_editor")]
    pub editor: ServiceConfig,

    /// Optional per-volume sync daemons
    #[serde(default)]
    pub storage_sync: Vec<StorageSyncConfig>,
}

/// Launch template for one daemon.
///
/// Arguments may contain `{port}` and `{persistent_dir}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub port: u16,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

/// Sync daemon bound to one mounted volume.
///
/// Arguments may additionally contain `{volume_path}` and `{bucket}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSyncConfig {
    pub volume: VolumeKind,

    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Liveness sweep period
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Wait for daemons to exit after SIGTERM before SIGKILL
    #[serde(default = "default_shutdown_grace", with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_issuer_url() -> String {
    "http://keycloak:8080".to_string()
}

fn default_realm() -> String {
    "workspace".to_string()
}

fn default_client_id() -> String {
    "minio".to_string()
}

fn default_scope() -> String {
    "openid profile email".to_string()
}

fn default_storage_endpoint() -> String {
    "http://minio:9000".to_string()
}

fn default_storage_readiness_path() -> String {
    "/minio/health/live".to_string()
}

fn default_duration_seconds() -> u64 {
    3600
}

fn default_attempts() -> u32 {
    30
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_persistent_dir() -> PathBuf {
    PathBuf::from("/workspace")
}

fn default_uid() -> u32 {
    1000
}

fn default_mount_program() -> String {
    "s3fs".to_string()
}

fn default_mount_table() -> PathBuf {
    PathBuf::from("/proc/self/mountinfo")
}

fn default_volumes() -> Vec<VolumeConfig> {
    VolumeKind::ALL
        .iter()
        .map(|volume| VolumeConfig {
            volume: *volume,
            bucket: None,
            path: None,
        })
        .collect()
}

fn default_reverse_proxy() -> ServiceConfig {
    ServiceConfig {
        enabled: true,
        program: "nginx".to_string(),
        args: vec!["-g".to_string(), "daemon off;".to_string()],
        port: 80,
        env: HashMap::new(),
        working_dir: None,
    }
}

fn default_notebook() -> ServiceConfig {
    ServiceConfig {
        enabled: true,
        program: "jupyter".to_string(),
        args: [
            "lab",
            "--no-browser",
            "--ip=0.0.0.0",
            "--port={port}",
            "--ServerApp.root_dir={persistent_dir}",
            "--IdentityProvider.token=",
            "--ServerApp.password=",
            "--LabApp.news_url=None",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        port: 8090,
        env: HashMap::new(),
        working_dir: None,
    }
}

fn default_editor() -> ServiceConfig {
    ServiceConfig {
        enabled: true,
        program: "code-server".to_string(),
        args: [
            "--bind-addr",
            "0.0.0.0:{port}",
            "--auth",
            "none",
            "--disable-telemetry",
            "--disable-update-check",
            "{persistent_dir}",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        port: 8054,
        env: HashMap::new(),
        working_dir: None,
    }
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(10)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            issuer_url: default_issuer_url(),
            realm: default_realm(),
            client_id: default_client_id(),
            client_secret: None,
            username: String::new(),
            password: None,
            scope: default_scope(),
            readiness_path: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: default_storage_endpoint(),
            readiness_path: default_storage_readiness_path(),
            duration_seconds: default_duration_seconds(),
            fallback: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay: default_retry_delay(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for MountsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            persistent_dir: default_persistent_dir(),
            uid: default_uid(),
            gid: default_uid(),
            desktop_dir: None,
            program: default_mount_program(),
            extra_options: Vec::new(),
            unmount_on_exit: true,
            mount_table: default_mount_table(),
            volumes: default_volumes(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            reverse_proxy: default_reverse_proxy(),
            notebook: default_notebook(),
            editor: default_editor(),
            storage_sync: Vec::new(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: default_sweep_interval(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "workspace".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                labels: None,
            },
            spec: BootstrapSpec::default(),
        }
    }
}

/// Resolve a configured secret, following `env:VAR_NAME` indirection.
///
/// Returns `None` for an unset variable or an empty value.
pub fn resolve_secret(value: &str) -> Option<String> {
    let resolved = match value.strip_prefix("env:") {
        Some(var) => std::env::var(var).ok()?,
        None => value.to_string(),
    };
    if resolved.is_empty() {
        None
    } else {
        Some(resolved)
    }
}

/// Replace `{name}` placeholders in a launch argument.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), value)
    })
}

impl ServiceConfig {
    pub fn render_args(&self, persistent_dir: &Path) -> Vec<String> {
        let port = self.port.to_string();
        let dir = persistent_dir.display().to_string();
        let vars = [("port", port.as_str()), ("persistent_dir", dir.as_str())];
        self.args.iter().map(|a| render_template(a, &vars)).collect()
    }
}

impl StorageSyncConfig {
    pub fn render_args(&self, persistent_dir: &Path, entry: &MountEntry) -> Vec<String> {
        let dir = persistent_dir.display().to_string();
        let volume_path = entry.local_path.display().to_string();
        let vars = [
            ("persistent_dir", dir.as_str()),
            ("volume_path", volume_path.as_str()),
            ("bucket", entry.bucket.as_str()),
        ];
        self.args.iter().map(|a| render_template(a, &vars)).collect()
    }
}

impl MountsConfig {
    pub fn owner(&self) -> MountOwner {
        MountOwner {
            uid: self.uid,
            gid: self.gid,
        }
    }

    pub fn desktop_dir(&self) -> Option<PathBuf> {
        self.desktop_dir.clone().or_else(dirs::desktop_dir)
    }
}

impl BootstrapConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Candidate paths in discovery order, after an explicit `--config`.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(path));
        }
        paths.push(PathBuf::from("./workspace-bootstrap.yaml"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".workspace").join("bootstrap.yaml"));
        }
        paths.push(PathBuf::from("/etc/workspace/bootstrap.yaml"));
        paths
    }

    /// Discover configuration file using precedence order
    /// 1. WORKSPACE_BOOTSTRAP_CONFIG environment variable
    /// 2. ./workspace-bootstrap.yaml (working directory)
    /// 3. ~/.workspace/bootstrap.yaml (user home)
    /// 4. /etc/workspace/bootstrap.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|p| p.exists())
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // 1. Explicit CLI path (Fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        // 2. Discovery (Env -> Cwd -> Home -> System)
        let mut config = if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::info!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let identity = &mut self.spec.identity;
        if let Some(val) = get("KEYCLOAK_URL") {
            identity.issuer_url = val;
        }
        if let Some(val) = get("KEYCLOAK_REALM") {
            identity.realm = val;
        }
        if let Some(val) = get("KEYCLOAK_CLIENT_ID") {
            identity.client_id = val;
        }
        if let Some(val) = get("KEYCLOAK_CLIENT_SECRET") {
            identity.client_secret = Some(val);
        }
        if let Some(val) = get("WORKSPACE_USERNAME").or_else(|| get("MAIN_USER")) {
            identity.username = val;
        }
        if let Some(val) = get("WORKSPACE_PASSWORD") {
            identity.password = Some(val);
        }

        let storage = &mut self.spec.storage;
        if let Some(val) = get("MINIO_ENDPOINT") {
            storage.endpoint = if val.starts_with("http://") || val.starts_with("https://") {
                val
            } else {
                format!("http://{}", val)
            };
        }
        match (get("MINIO_ACCESS_KEY"), get("MINIO_SECRET_KEY")) {
            (Some(access_key), Some(secret_key)) => {
                storage.fallback = Some(FallbackCredential {
                    access_key,
                    secret_key,
                });
            }
            (None, None) => {}
            _ => {
                tracing::warn!(
                    "Only one of MINIO_ACCESS_KEY / MINIO_SECRET_KEY is set. Ignoring both."
                );
            }
        }

        let mounts = &mut self.spec.mounts;
        if let Some(val) = get("PERSISTENT_DIR") {
            mounts.persistent_dir = PathBuf::from(val);
        }
        for (key, target) in [("WORKSPACE_UID", &mut mounts.uid), ("WORKSPACE_GID", &mut mounts.gid)] {
            if let Some(val) = get(key) {
                match val.parse::<u32>() {
                    Ok(id) => *target = id,
                    Err(_) => {
                        tracing::warn!("Invalid value for {}: '{}'. Expected a number. Ignoring.", key, val);
                    }
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;
        url::Url::parse(&spec.identity.issuer_url).map_err(|e| {
            anyhow::anyhow!("Invalid identity.issuer_url '{}': {}", spec.identity.issuer_url, e)
        })?;
        url::Url::parse(&spec.storage.endpoint).map_err(|e| {
            anyhow::anyhow!("Invalid storage.endpoint '{}': {}", spec.storage.endpoint, e)
        })?;

        if spec.identity.realm.is_empty() {
            anyhow::bail!("identity.realm cannot be empty");
        }

        if spec.retry.attempts == 0 {
            anyhow::bail!("retry.attempts must be at least 1");
        }

        if spec.supervisor.sweep_interval.is_zero() {
            anyhow::bail!("supervisor.sweep_interval must be greater than zero");
        }

        if !spec.mounts.persistent_dir.is_absolute() {
            anyhow::bail!(
                "mounts.persistent_dir must be absolute: {:?}",
                spec.mounts.persistent_dir
            );
        }

        let mut seen = Vec::new();
        for volume in &spec.mounts.volumes {
            if seen.contains(&volume.volume) {
                anyhow::bail!("Volume '{}' is declared more than once", volume.volume);
            }
            seen.push(volume.volume);
        }

        for sync in &spec.services.storage_sync {
            if !seen.contains(&sync.volume) {
                anyhow::bail!(
                    "storage_sync references undeclared volume '{}'",
                    sync.volume
                );
            }
            if sync.program.is_empty() {
                anyhow::bail!("storage_sync program cannot be empty for volume '{}'", sync.volume);
            }
        }

        for (name, service) in [
            ("reverse_proxy", &spec.services.reverse_proxy),
            ("notebook", &spec.services.notebook),
            ("editor", &spec.services.editor),
        ] {
            if service.enabled && service.program.is_empty() {
                anyhow::bail!("services.{}.program cannot be empty", name);
            }
        }

        Ok(())
    }

    /// Resource-owner credentials, if both username and password resolve.
    pub fn resource_owner(&self) -> Option<ResourceOwner> {
        let identity = &self.spec.identity;
        if identity.username.is_empty() {
            return None;
        }
        let password = identity.password.as_deref().and_then(resolve_secret)?;
        Some(ResourceOwner {
            username: identity.username.clone(),
            password,
        })
    }

    /// Fallback credential with `env:` indirection resolved.
    pub fn fallback_credential(&self) -> Option<FallbackCredential> {
        let fallback = self.spec.storage.fallback.as_ref()?;
        let credential = FallbackCredential {
            access_key: resolve_secret(&fallback.access_key)?,
            secret_key: resolve_secret(&fallback.secret_key)?,
        };
        Some(credential)
    }

    /// One pending [`MountEntry`] per configured volume.
    ///
    /// A volume whose bucket resolves to an empty name (the private volume
    /// without a workspace username) is left out.
    pub fn mount_entries(&self) -> Vec<MountEntry> {
        let mounts = &self.spec.mounts;
        mounts
            .volumes
            .iter()
            .filter_map(|v| {
                let bucket = v.bucket.clone().unwrap_or_else(|| match v.volume {
                    VolumeKind::Private => self.spec.identity.username.clone(),
                    VolumeKind::Common => "common".to_string(),
                });
                if bucket.is_empty() {
                    tracing::warn!(volume = %v.volume, "No bucket name for volume, not mounting it");
                    return None;
                }
                let path = v
                    .path
                    .clone()
                    .unwrap_or_else(|| mounts.persistent_dir.join(v.volume.as_str()));
                Some(MountEntry::new(v.volume, bucket, path))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_manifest() {
        let config = BootstrapConfig::default();
        assert_eq!(config.api_version, API_VERSION);
        assert_eq!(config.kind, KIND);
        assert!(!config.metadata.name.is_empty());
        assert_eq!(config.spec.identity.realm, "workspace");
        assert_eq!(config.spec.mounts.volumes.len(), 2);
        assert_eq!(config.spec.services.notebook.port, 8090);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
apiVersion: workspace.dtaas/v1
kind: WorkspaceBootstrap
metadata:
  name: user1-workspace
spec:
  identity:
    username: user1
    password: env:WORKSPACE_TEST_PASSWORD_UNSET
  retry:
    attempts: 3
    delay: 250ms
  supervisor:
    sweep_interval: 1s
"#;
        let config = BootstrapConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.spec.retry.attempts, 3);
        assert_eq!(config.spec.retry.delay, Duration::from_millis(250));
        assert_eq!(config.spec.supervisor.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.spec.supervisor.shutdown_grace, Duration::from_secs(10));
        assert_eq!(config.spec.storage.endpoint, "http://minio:9000");
        // env: indirection to an unset variable resolves to nothing
        assert!(config.resource_owner().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BootstrapConfig::default();
        config.apply_overrides(overrides(&[
            ("KEYCLOAK_URL", "http://idp.local:8180"),
            ("MAIN_USER", "user2"),
            ("WORKSPACE_PASSWORD", "user2password"),
            ("MINIO_ENDPOINT", "minio:9000"),
            ("MINIO_ACCESS_KEY", "minioadmin"),
            ("MINIO_SECRET_KEY", "minioadmin123"),
            ("WORKSPACE_UID", "1001"),
            ("WORKSPACE_GID", "not-a-number"),
        ]));

        assert_eq!(config.spec.identity.issuer_url, "http://idp.local:8180");
        assert_eq!(config.spec.identity.username, "user2");
        assert_eq!(config.spec.storage.endpoint, "http://minio:9000");
        assert_eq!(config.spec.mounts.uid, 1001);
        assert_eq!(config.spec.mounts.gid, 1000);

        let owner = config.resource_owner().unwrap();
        assert_eq!(owner.password, "user2password");

        let fallback = config.fallback_credential().unwrap();
        assert_eq!(fallback.access_key, "minioadmin");
    }

    #[test]
    fn test_half_configured_fallback_is_ignored() {
        let mut config = BootstrapConfig::default();
        config.apply_overrides(overrides(&[("MINIO_ACCESS_KEY", "minioadmin")]));
        assert!(config.fallback_credential().is_none());
    }

    #[test]
    fn test_mount_entries_default_buckets() {
        let mut config = BootstrapConfig::default();
        config.spec.identity.username = "user1".to_string();
        config.spec.mounts.persistent_dir = PathBuf::from("/workspace");

        let entries = config.mount_entries();
        assert_eq!(entries[0].volume, VolumeKind::Private);
        assert_eq!(entries[0].bucket, "user1");
        assert_eq!(entries[0].local_path, PathBuf::from("/workspace/private"));
        assert_eq!(entries[1].bucket, "common");
        assert_eq!(entries[1].local_path, PathBuf::from("/workspace/common"));
    }

    #[test]
    fn test_private_volume_without_username_is_left_out() {
        let mut config = BootstrapConfig::default();
        config.spec.identity.username = String::new();

        let entries = config.mount_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].volume, VolumeKind::Common);
        assert_eq!(entries[0].bucket, "common");
    }

    #[test]
    fn test_render_args() {
        let config = BootstrapConfig::default();
        let args = config
            .spec
            .services
            .editor
            .render_args(Path::new("/workspace"));
        assert!(args.contains(&"0.0.0.0:8054".to_string()));
        assert_eq!(args.last().unwrap(), "/workspace");

        let notebook = config
            .spec
            .services
            .notebook
            .render_args(Path::new("/workspace"));
        assert!(notebook.contains(&"--ServerApp.root_dir=/workspace".to_string()));
    }

    #[test]
    fn test_validation() {
        let mut config = BootstrapConfig::default();
        assert!(config.validate().is_ok());

        config.api_version = "wrong/v1".to_string();
        assert!(config.validate().is_err());
        config.api_version = API_VERSION.to_string();

        config.spec.retry.attempts = 0;
        assert!(config.validate().is_err());
        config.spec.retry.attempts = 1;

        config.spec.mounts.persistent_dir = PathBuf::from("relative/dir");
        assert!(config.validate().is_err());
        config.spec.mounts.persistent_dir = PathBuf::from("/workspace");

        config.spec.storage.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());
        config.spec.storage.endpoint = "http://minio:9000".to_string();

        config.spec.mounts.volumes.truncate(1);
        config.spec.services.storage_sync.push(StorageSyncConfig {
            volume: VolumeKind::Common,
            program: "rclone".to_string(),
            args: vec![],
            env: HashMap::new(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_secret() {
        assert_eq!(resolve_secret("plain"), Some("plain".to_string()));
        assert_eq!(resolve_secret(""), None);
        assert_eq!(resolve_secret("env:WORKSPACE_BOOTSTRAP_SURELY_UNSET_VAR"), None);
    }
}
