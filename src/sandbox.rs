//! Sandbox contract and registry (C3 + C4).
//!
//! [`Sandbox`] is the per-instance lifecycle + execution contract every
//! concrete sandbox kind implements. [`SandboxRegistry`] is the factory-table
//! counterpart of [`crate::tools::ToolRegistry`]: it maps [`SandboxKind`] to a
//! constructor closure rather than holding concrete sandbox types, so the
//! manager (C7) never needs a match arm per kind.

pub mod container;
pub mod dummy;
pub mod notebook;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::EnclaveResult;
use crate::model::config::AnySandboxConfig;
use crate::model::{CommandResult, CommandSpec, SandboxInfo, SandboxKind, SandboxStatus, ToolResult};
use crate::tools::{Tool, ToolRegistry};

/// An isolated execution environment: a running instance of some
/// [`SandboxKind`], bound to a fixed set of tools at start time.
///
/// Implementations are responsible for their own internal locking —
/// [`crate::manager::LocalManager`] calls through a shared `Arc<dyn Sandbox>`
/// from multiple tasks (lease holder + janitor).
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Stable identifier assigned at creation (§3 invariant 1).
    fn id(&self) -> &str;

    fn kind(&self) -> SandboxKind;

    /// Current lifecycle state. Cheap and non-blocking; does not probe the
    /// engine (a stale `Running` is resolved the next time an operation
    /// against the engine actually fails, per §4.2).
    async fn status(&self) -> SandboxStatus;

    /// A point-in-time snapshot for listing/introspection endpoints.
    async fn info(&self) -> SandboxInfo;

    /// Brings the sandbox from `Initializing` to `Running`, binding the
    /// tools named in its config's `tools_config` (§3 invariant 6: a tool
    /// whose `required_kind` doesn't match this sandbox's kind is a
    /// `SandboxStart` error, not a silently skipped bind).
    async fn start(&self, registry: &ToolRegistry) -> EnclaveResult<()>;

    /// Runs a raw command, never returning `Err` for engine-level failure —
    /// converts timeouts/non-zero exits/engine errors into a `CommandResult`
    /// with the matching `ExecutionStatus` (§7 propagation policy).
    async fn execute_command(
        &self,
        command: CommandSpec,
        timeout: Option<Duration>,
    ) -> CommandResult;

    /// Runs a tool previously bound by [`Sandbox::start`] by name.
    async fn execute_tool(&self, tool_name: &str, params: serde_json::Value) -> ToolResult {
        match self.bound_tool(tool_name).await {
            Some(tool) => tool.execute(self, params).await,
            None => ToolResult::error(tool_name, format!("tool '{tool_name}' is not bound")),
        }
    }

    /// Looks up a tool bound during `start`, if any.
    async fn bound_tool(&self, name: &str) -> Option<Arc<dyn Tool>>;

    /// Requests a graceful stop (`Running` -> `Stopping` -> `Stopped`).
    async fn stop(&self) -> EnclaveResult<()>;

    /// Tears down engine-side resources. Idempotent: calling `cleanup` on an
    /// already-cleaned-up sandbox is a no-op, not an error (§4.3.2, the
    /// janitor may race a caller's explicit stop).
    async fn cleanup(&self) -> EnclaveResult<()>;
}

type SandboxFactory =
    Arc<dyn Fn(AnySandboxConfig, Option<String>) -> EnclaveResult<Arc<dyn Sandbox>> + Send + Sync>;

/// Factory table mapping [`SandboxKind`] to a constructor, mirroring
/// [`crate::tools::ToolRegistry`]'s "explicit table, not ambient singleton"
/// shape (§9 design note).
pub struct SandboxRegistry {
    factories: HashMap<SandboxKind, SandboxFactory>,
}

impl SandboxRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with the dummy kind always available, plus a container
    /// factory built against the supplied Docker client and a notebook
    /// factory built against the same client. Construction fails only if
    /// connecting to the engine fails — individual `create` calls fail per
    /// kind/config afterward.
    pub fn with_builtins(docker: bollard::Docker) -> Self {
        let mut registry = Self::new();
        registry.register(SandboxKind::Dummy, |config, id| {
            Ok(Arc::new(dummy::DummySandbox::new(config, id)) as Arc<dyn Sandbox>)
        });

        let docker_for_container = docker.clone();
        registry.register(SandboxKind::Container, move |config, id| {
            let config = match config {
                AnySandboxConfig::Container(c) => c,
                other => {
                    return Err(crate::error::EnclaveError::Config(format!(
                        "sandbox kind 'container' requires a container config, got {}",
                        other.kind()
                    )));
                }
            };
            Ok(Arc::new(container::ContainerSandbox::new(
                docker_for_container.clone(),
                config,
                id,
            )) as Arc<dyn Sandbox>)
        });

        registry.register(SandboxKind::ContainerNotebook, move |config, id| {
            let config = match config {
                AnySandboxConfig::ContainerNotebook(c) => c,
                other => {
                    return Err(crate::error::EnclaveError::Config(format!(
                        "sandbox kind 'container-notebook' requires a notebook config, got {}",
                        other.kind()
                    )));
                }
            };
            Ok(Arc::new(notebook::NotebookSandbox::new(
                docker.clone(),
                config,
                id,
            )) as Arc<dyn Sandbox>)
        });

        registry
    }

    pub fn register<F>(&mut self, kind: SandboxKind, factory: F)
    where
        F: Fn(AnySandboxConfig, Option<String>) -> EnclaveResult<Arc<dyn Sandbox>>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
    }

    /// Constructs a fresh, not-yet-started sandbox for `config`, optionally
    /// under a caller-supplied id (§4.3: "if id omitted, allocate"). Fails
    /// with `Config` if no factory is registered for `config.kind()`.
    pub fn create(
        &self,
        config: AnySandboxConfig,
        id: Option<String>,
    ) -> EnclaveResult<Arc<dyn Sandbox>> {
        let kind = config.kind();
        let factory = self.factories.get(&kind).ok_or_else(|| {
            crate::error::EnclaveError::Config(format!("no factory registered for kind {kind}"))
        })?;
        factory(config, id)
    }
}

impl Default for SandboxRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared bookkeeping every concrete `Sandbox` impl embeds: identity,
/// lifecycle status, timestamps, and bound tools. Mirrors the fields the
/// teacher's `DockerSandbox`/`ContainerInfo` pair tracks separately; kept as
/// one struct here so `container`, `notebook`, and `dummy` don't each
/// reimplement the same `Mutex<SandboxStatus>` bookkeeping.
pub(crate) struct SandboxCore {
    pub id: String,
    pub kind: SandboxKind,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub status: tokio::sync::Mutex<SandboxStatus>,
    pub last_used: tokio::sync::Mutex<chrono::DateTime<chrono::Utc>>,
    pub metadata: tokio::sync::Mutex<HashMap<String, String>>,
    pub tools: tokio::sync::Mutex<HashMap<String, Arc<dyn Tool>>>,
}

impl SandboxCore {
    pub fn new(kind: SandboxKind) -> Self {
        Self::with_id(None, kind)
    }

    /// Same as [`SandboxCore::new`], but honors a caller-supplied id
    /// (`create_sandbox(kind, config, id?)`, §4.3) instead of always
    /// allocating one.
    pub fn with_id(id: Option<String>, kind: SandboxKind) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: id.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),
            kind,
            created_at: now,
            status: tokio::sync::Mutex::new(SandboxStatus::Initializing),
            last_used: tokio::sync::Mutex::new(now),
            metadata: tokio::sync::Mutex::new(HashMap::new()),
            tools: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn set_status(&self, status: SandboxStatus) {
        *self.status.lock().await = status;
    }

    pub async fn set_error(&self, reason: impl Into<String>) {
        self.metadata
            .lock()
            .await
            .insert("error".to_string(), reason.into());
        self.set_status(SandboxStatus::Error).await;
    }

    pub async fn touch(&self) {
        *self.last_used.lock().await = chrono::Utc::now();
    }

    pub async fn info(&self) -> SandboxInfo {
        let tools = self.tools.lock().await;
        SandboxInfo {
            id: self.id.clone(),
            kind: self.kind,
            status: *self.status.lock().await,
            created_at: self.created_at,
            last_used: *self.last_used.lock().await,
            metadata: self.metadata.lock().await.clone(),
            tools: tools.keys().cloned().collect(),
        }
    }

    /// Binds `tool_names` by resolving each through `registry`, checking
    /// `required_kind` against this sandbox's own kind (§3 invariant 6).
    pub async fn bind_tools(
        &self,
        registry: &ToolRegistry,
        tool_names: impl IntoIterator<Item = &str>,
    ) -> EnclaveResult<()> {
        let mut bound = HashMap::new();
        for name in tool_names {
            let tool = registry.create(name)?;
            if tool.required_kind() != self.kind {
                return Err(crate::error::EnclaveError::SandboxStart(format!(
                    "tool '{name}' requires sandbox kind {} but this sandbox is {}",
                    tool.required_kind(),
                    self.kind
                )));
            }
            bound.insert(name.to_string(), tool);
        }
        *self.tools.lock().await = bound;
        Ok(())
    }

    pub async fn bound_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.lock().await.get(name).cloned()
    }
}
