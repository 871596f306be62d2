//! Sandbox and manager configuration records.
//!
//! These are the "how to build it" counterparts to the "what happened"
//! records in the parent [`crate::model`] module. `ContainerSandboxConfig`
//! and `NotebookSandboxConfig` extend `SandboxConfig` by composition
//! (a `base: SandboxConfig` field) rather than inheritance, the idiomatic
//! substitute the teacher's config schema uses for its own tagged configs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::SandboxKind;

/// Base configuration shared by every sandbox kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Hard wall-clock timeout applied to commands that don't specify their own.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub env: HashMap<String, String>,

    pub working_dir: Option<String>,

    /// Tool name -> per-instance parameter map, resolved at sandbox start
    /// into bound [`crate::tools::Tool`] instances (§3 invariant 6).
    #[serde(default)]
    pub tools_config: HashMap<String, serde_json::Value>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            env: HashMap::new(),
            working_dir: None,
            tools_config: HashMap::new(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// A host path bound into the container at `bind`, with a read/write `mode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMount {
    pub bind: String,
    /// Engine-native mode string, e.g. `"rw"` or `"ro"`.
    #[serde(default = "default_mount_mode")]
    pub mode: String,
}

fn default_mount_mode() -> String {
    "rw".to_string()
}

/// A container-port publish target: `host` interface + `port`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortPublish {
    pub host: String,
    pub port: u16,
}

/// Configuration for [`crate::sandbox::container::ContainerSandbox`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSandboxConfig {
    #[serde(flatten)]
    pub base: SandboxConfig,

    pub image: String,
    pub command: Option<Vec<String>>,

    /// Engine-native units, e.g. `"512m"`.
    pub memory_limit: Option<String>,
    /// Fractional cores; translated to `cpu_quota = cpu_limit * 100_000`
    /// with `cpu_period = 100_000` per §4.2.
    pub cpu_limit: Option<f64>,

    /// Host path -> mount spec.
    #[serde(default)]
    pub volumes: HashMap<String, VolumeMount>,
    /// Container port (e.g. `"8888/tcp"`) -> host publish target.
    #[serde(default)]
    pub ports: HashMap<String, PortPublish>,

    #[serde(default = "default_network_enabled")]
    pub network_enabled: bool,
    pub network: Option<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub remove_on_exit: bool,
}

fn default_network_enabled() -> bool {
    true
}

impl ContainerSandboxConfig {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            base: SandboxConfig::default(),
            image: image.into(),
            command: None,
            memory_limit: None,
            cpu_limit: None,
            volumes: HashMap::new(),
            ports: HashMap::new(),
            network_enabled: default_network_enabled(),
            network: None,
            privileged: false,
            remove_on_exit: false,
        }
    }
}

/// The fixed kernel-gateway image marker: the image is always built
/// (if absent) from the vendored Dockerfile in
/// [`crate::sandbox::notebook`], never pulled from a registry.
pub const NOTEBOOK_IMAGE: &str = "enclave-kernel-gateway:latest";

/// Configuration for [`crate::sandbox::notebook::NotebookSandbox`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookSandboxConfig {
    #[serde(flatten)]
    pub container: ContainerSandboxConfig,

    pub host: String,
    pub port: u16,
}

impl NotebookSandboxConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let mut container = ContainerSandboxConfig::new(NOTEBOOK_IMAGE);
        container.ports.insert(
            "8888/tcp".to_string(),
            PortPublish {
                host: "0.0.0.0".to_string(),
                port,
            },
        );
        Self {
            container,
            host: host.into(),
            port,
        }
    }
}

/// Tagged union over the three [`SandboxConfig`] extensions, used wherever a
/// caller must supply "a config for kind K" without knowing K statically
/// (pool priming, the HTTP `POST /sandboxes` body, the sandbox registry).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnySandboxConfig {
    Container(ContainerSandboxConfig),
    ContainerNotebook(NotebookSandboxConfig),
    Dummy(SandboxConfig),
}

impl AnySandboxConfig {
    pub fn kind(&self) -> SandboxKind {
        match self {
            AnySandboxConfig::Container(_) => SandboxKind::Container,
            AnySandboxConfig::ContainerNotebook(_) => SandboxKind::ContainerNotebook,
            AnySandboxConfig::Dummy(_) => SandboxKind::Dummy,
        }
    }

    pub fn base(&self) -> &SandboxConfig {
        match self {
            AnySandboxConfig::Container(c) => &c.base,
            AnySandboxConfig::ContainerNotebook(c) => &c.container.base,
            AnySandboxConfig::Dummy(c) => c,
        }
    }
}

/// Configuration for the local manager (§4.3): janitor cadence and the pool
/// priming defaults used by [`crate::manager::LocalManager::start`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxManagerConfig {
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    #[serde(default)]
    pub default_pool_size: usize,
    pub idle_ttl_secs: Option<u64>,
    pub default_kind: Option<SandboxKind>,
    pub default_config: Option<AnySandboxConfig>,
}

impl Default for SandboxManagerConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval(),
            default_pool_size: 0,
            idle_ttl_secs: None,
            default_kind: None,
            default_config: None,
        }
    }
}

fn default_cleanup_interval() -> u64 {
    60
}
