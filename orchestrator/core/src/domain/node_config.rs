// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Defines the configuration schema for a gears host, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Storage root for gear content
// - Repository job settings (owner identity, container invocation)
// - Job timing (wait bound, unit polling)
// - systemd tool locations and scope
// - Logging

use crate::domain::paths::{GearPaths, DEFAULT_BASE_PATH};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "gears/v1";
pub const KIND: &str = "NodeConfig";

/// Top-level Kubernetes-style node configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigManifest {
    /// API version (must be "gears/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "NodeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: NodeConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable host name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfigSpec {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub systemd: SystemdConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root under which every gear artifact is stored
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
        }
    }
}

impl StorageConfig {
    pub fn paths(&self) -> GearPaths {
        GearPaths::new(&self.base_path)
    }
}

/// Settings of the repository creation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Numeric owner of every repository directory (host-wide)
    #[serde(default = "default_owner_id")]
    pub owner_uid: u32,

    #[serde(default = "default_owner_id")]
    pub owner_gid: u32,

    /// Container runtime binary invoked by the transient unit
    #[serde(default = "default_container_runtime")]
    pub container_runtime: String,

    /// Mount point of the repository inside the container
    #[serde(default = "default_container_path")]
    pub container_path: String,

    /// Resource-control group the transient unit is placed in
    #[serde(default = "default_slice")]
    pub slice: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            owner_uid: default_owner_id(),
            owner_gid: default_owner_id(),
            container_runtime: default_container_runtime(),
            container_path: default_container_path(),
            slice: default_slice(),
        }
    }
}

impl RepositoryConfig {
    /// Command line of the container that populates a repository.
    ///
    /// The container removes itself on exit, attaches stdout and stderr,
    /// runs as the repository owner and sees the repository read-write.
    /// `image` and `clone_url` are passed last.
    pub fn container_argv(
        &self,
        repository_path: &Path,
        image: &str,
        clone_url: &str,
    ) -> Vec<String> {
        vec![
            self.container_runtime.clone(),
            "run".to_string(),
            "--rm".to_string(),
            "-a".to_string(),
            "stderr".to_string(),
            "-a".to_string(),
            "stdout".to_string(),
            "-u".to_string(),
            self.owner_uid.to_string(),
            "-v".to_string(),
            format!("{}:{}:rw", repository_path.display(), self.container_path),
            image.to_string(),
            clone_url.to_string(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Upper bound on waiting for a started unit to leave "running"
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_seconds: u64,

    /// Interval between two looks at unit state
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// State-change batches buffered per watch
    #[serde(default = "default_poll_batch_size")]
    pub poll_batch_size: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            wait_timeout_seconds: default_wait_timeout(),
            poll_interval_ms: default_poll_interval(),
            poll_batch_size: default_poll_batch_size(),
        }
    }
}

impl JobsConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemdConfig {
    #[serde(default = "default_systemctl")]
    pub systemctl_path: String,

    #[serde(default = "default_systemd_run")]
    pub systemd_run_path: String,

    #[serde(default = "default_journalctl")]
    pub journalctl_path: String,

    /// Talk to the per-user manager instead of the system manager
    #[serde(default)]
    pub user_mode: bool,
}

impl Default for SystemdConfig {
    fn default() -> Self {
        Self {
            systemctl_path: default_systemctl(),
            systemd_run_path: default_systemd_run(),
            journalctl_path: default_journalctl(),
            user_mode: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
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

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_base_path() -> PathBuf {
    PathBuf::from(DEFAULT_BASE_PATH)
}

fn default_owner_id() -> u32 {
    1001
}

fn default_container_runtime() -> String {
    "/usr/bin/docker".to_string()
}

fn default_container_path() -> String {
    "/home/git/repo".to_string()
}

fn default_slice() -> String {
    "gear.slice".to_string()
}

fn default_wait_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_poll_batch_size() -> usize {
    2
}

fn default_systemctl() -> String {
    "systemctl".to_string()
}

fn default_systemd_run() -> String {
    "systemd-run".to_string()
}

fn default_journalctl() -> String {
    "journalctl".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for NodeConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "gears-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                labels: None,
            },
            spec: NodeConfigSpec::default(),
        }
    }
}

impl NodeConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. GEARS_CONFIG_PATH environment variable
    /// 2. ./gears-config.yaml (working directory)
    /// 3. ~/.gears/config.yaml (user home)
    /// 4. /etc/gears/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GEARS_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./gears-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".gears").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/gears/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must load
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GEARS_BASE_PATH") {
            if !val.is_empty() {
                tracing::info!("Environment override: GEARS_BASE_PATH={}", val);
                self.spec.storage.base_path = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var("GEARS_SYSTEMD_USER_MODE") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: GEARS_SYSTEMD_USER_MODE=true");
                    self.spec.systemd.user_mode = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: GEARS_SYSTEMD_USER_MODE=false");
                    self.spec.systemd.user_mode = false;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for GEARS_SYSTEMD_USER_MODE: '{}'. \
                         Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }
    }

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

        if !self.spec.storage.base_path.is_absolute() {
            anyhow::bail!(
                "spec.storage.base_path must be absolute: {}",
                self.spec.storage.base_path.display()
            );
        }

        let repository = &self.spec.repository;
        if repository.container_runtime.is_empty() {
            anyhow::bail!("spec.repository.container_runtime cannot be empty");
        }
        if repository.container_path.is_empty() {
            anyhow::bail!("spec.repository.container_path cannot be empty");
        }
        if repository.slice.is_empty() {
            anyhow::bail!("spec.repository.slice cannot be empty");
        }

        let jobs = &self.spec.jobs;
        if jobs.wait_timeout_seconds == 0 {
            anyhow::bail!("spec.jobs.wait_timeout_seconds must be greater than zero");
        }
        if jobs.poll_interval_ms == 0 {
            anyhow::bail!("spec.jobs.poll_interval_ms must be greater than zero");
        }
        if jobs.poll_batch_size == 0 {
            anyhow::bail!("spec.jobs.poll_batch_size must be greater than zero");
        }

        if let Some(logging) = self.spec.observability.as_ref().and_then(|o| o.logging.as_ref()) {
            if logging.format != "json" && logging.format != "text" {
                anyhow::bail!(
                    "Invalid log format: '{}'. Expected 'json' or 'text'",
                    logging.format
                );
            }
        }

        Ok(())
    }

    pub fn logging(&self) -> LoggingConfig {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = NodeConfigManifest::default();
        assert_eq!(manifest.api_version, "gears/v1");
        assert_eq!(manifest.kind, "NodeConfig");
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.storage.base_path, PathBuf::from("/var/lib/gears"));
        assert_eq!(manifest.spec.repository.owner_uid, 1001);
        assert_eq!(manifest.spec.jobs.wait_timeout(), Duration::from_secs(10));
        assert_eq!(manifest.spec.jobs.poll_interval(), Duration::from_secs(1));
        assert_eq!(manifest.spec.jobs.poll_batch_size, 2);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
apiVersion: gears/v1
kind: NodeConfig
metadata:
  name: host-a
spec:
  storage:
    base_path: /srv/gears
  repository:
    owner_uid: 2000
  jobs:
    wait_timeout_seconds: 30
"#;
        let manifest = NodeConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "host-a");
        assert_eq!(manifest.spec.storage.base_path, PathBuf::from("/srv/gears"));
        assert_eq!(manifest.spec.repository.owner_uid, 2000);
        assert_eq!(manifest.spec.repository.owner_gid, 1001);
        assert_eq!(manifest.spec.repository.slice, "gear.slice");
        assert_eq!(manifest.spec.jobs.wait_timeout_seconds, 30);
        assert_eq!(manifest.spec.jobs.poll_batch_size, 2);
        assert!(!manifest.spec.systemd.user_mode);
        assert_eq!(manifest.logging().format, "text");
    }

    #[test]
    fn test_container_argv() {
        let repository = RepositoryConfig::default();
        let argv = repository.container_argv(
            Path::new("/var/lib/gears/git/beef"),
            "gears/git-clone",
            "https://example.com/repo.git",
        );
        assert_eq!(
            argv,
            vec![
                "/usr/bin/docker",
                "run",
                "--rm",
                "-a",
                "stderr",
                "-a",
                "stdout",
                "-u",
                "1001",
                "-v",
                "/var/lib/gears/git/beef:/home/git/repo:rw",
                "gears/git-clone",
                "https://example.com/repo.git",
            ]
        );
    }

    #[test]
    fn test_validation() {
        let mut manifest = NodeConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "WrongKind".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.storage.base_path = PathBuf::from("relative/gears");
        assert!(manifest.validate().is_err());
        manifest.spec.storage.base_path = PathBuf::from("/var/lib/gears");

        manifest.spec.jobs.poll_batch_size = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.jobs.poll_batch_size = 2;

        manifest.spec.observability = Some(ObservabilityConfig {
            logging: Some(LoggingConfig {
                level: "debug".to_string(),
                format: "xml".to_string(),
            }),
        });
        assert!(manifest.validate().is_err());
    }
}
