//! Local (in-process) sandbox manager (C7) — the hardest subsystem per
//! spec.md §4.3: tracks every sandbox created in this process, serializes
//! pool membership under one mutex, runs a periodic janitor, and reports
//! stats. Grounded in the teacher's `orchestrator.rs` (the struct that owns
//! a `SandboxPool` + background bookkeeping and exposes `run_with_tests`),
//! generalized from "run one batch of tests" to "own a dynamic, long-lived
//! set of sandboxes with create/stop/delete/execute_tool".

pub mod janitor;
pub mod pool;
pub mod stats;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{EnclaveError, EnclaveResult};
use crate::model::config::{AnySandboxConfig, SandboxManagerConfig};
use crate::model::{SandboxInfo, SandboxKind, SandboxStatus, ToolResult};
use crate::sandbox::{Sandbox, SandboxRegistry};
use crate::tools::ToolRegistry;
use pool::SandboxPool;
use stats::{ManagerStats, PoolStats};

/// The config+kind the pool was primed with, kept so a dead pool member can
/// be replaced in kind (§4.3.1 step 4: "asynchronously replace it").
struct PoolTemplate {
    kind: SandboxKind,
    config: AnySandboxConfig,
}

/// In-process authority over every sandbox this process has created.
///
/// Mirrors spec.md §4.3's state: a sandbox-id -> handle map, a warm pool
/// (FIFO idle queue + busy set) guarded by its own mutex, a cancellable
/// janitor, and creation-time indices for TTL decisions (`Sandbox::info`
/// carries `last_used` itself, so the manager doesn't duplicate it).
pub struct LocalManager {
    sandbox_registry: SandboxRegistry,
    tool_registry: ToolRegistry,
    config: SandboxManagerConfig,

    sandboxes: Mutex<HashMap<String, Arc<dyn Sandbox>>>,
    pool: SandboxPool,
    pool_initialized: Mutex<bool>,
    pool_template: Mutex<Option<PoolTemplate>>,

    janitor: Mutex<Option<JoinHandle<()>>>,
    started_at: Instant,
    last_janitor_run: Mutex<Option<DateTime<Utc>>>,
    last_cleanup_errors: Mutex<Vec<String>>,
}

impl LocalManager {
    pub fn new(
        sandbox_registry: SandboxRegistry,
        tool_registry: ToolRegistry,
        config: SandboxManagerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            sandbox_registry,
            tool_registry,
            config,
            sandboxes: Mutex::new(HashMap::new()),
            pool: SandboxPool::new(),
            pool_initialized: Mutex::new(false),
            pool_template: Mutex::new(None),
            janitor: Mutex::new(None),
            started_at: Instant::now(),
            last_janitor_run: Mutex::new(None),
            last_cleanup_errors: Mutex::new(Vec::new()),
        })
    }

    /// Primes the default pool (if configured) and spawns the janitor.
    /// Mirrors the teacher's `Orchestrator::run_with_tests` entry point,
    /// generalized from "run once" to "start a long-lived service".
    pub async fn start(self: &Arc<Self>) -> EnclaveResult<()> {
        if self.config.default_pool_size > 0 {
            let kind = self.config.default_kind.ok_or_else(|| {
                EnclaveError::Config(
                    "default_pool_size > 0 requires default_kind to be set".to_string(),
                )
            })?;
            let config = self.config.default_config.clone().ok_or_else(|| {
                EnclaveError::Config(
                    "default_pool_size > 0 requires default_config to be set".to_string(),
                )
            })?;
            self.initialize_pool(self.config.default_pool_size, kind, config)
                .await?;
        }
        *self.janitor.lock().await = Some(janitor::spawn(
            self.clone(),
            Duration::from_secs(self.config.cleanup_interval_secs),
        ));
        Ok(())
    }

    /// Cancels the janitor (awaiting its shutdown) then drains every
    /// tracked sandbox. §4.3.2: "stop must await cancellation before
    /// proceeding to cleanup_all_sandboxes".
    pub async fn stop(self: &Arc<Self>) -> EnclaveResult<()> {
        if let Some(handle) = self.janitor.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        self.cleanup_all_sandboxes().await;
        Ok(())
    }

    /// Creates and starts a sandbox of `kind`. On start failure, calls
    /// `cleanup` (best-effort) and surfaces `SandboxStartError` — the
    /// sandbox is never left in the map (§4.3 "create_sandbox").
    pub async fn create_sandbox(
        &self,
        kind: SandboxKind,
        config: AnySandboxConfig,
        id: Option<String>,
    ) -> EnclaveResult<String> {
        if config.kind() != kind {
            return Err(EnclaveError::Config(format!(
                "config kind {} does not match requested kind {}",
                config.kind(),
                kind
            )));
        }
        let sandbox = self.sandbox_registry.create(config, id)?;
        if let Err(e) = sandbox.start(&self.tool_registry).await {
            let _ = sandbox.cleanup().await;
            return Err(e);
        }
        let id = sandbox.id().to_string();
        self.sandboxes.lock().await.insert(id.clone(), sandbox);
        Ok(id)
    }

    pub async fn get_sandbox_info(&self, id: &str) -> Option<SandboxInfo> {
        let sandbox = self.sandboxes.lock().await.get(id).cloned()?;
        Some(sandbox.info().await)
    }

    /// Snapshot read, optionally filtered by status. Never leaks handles —
    /// only `SandboxInfo` values cross this boundary (§4.3).
    pub async fn list_sandboxes(&self, status: Option<SandboxStatus>) -> Vec<SandboxInfo> {
        let sandboxes: Vec<Arc<dyn Sandbox>> =
            self.sandboxes.lock().await.values().cloned().collect();
        let infos = join_all(sandboxes.iter().map(|s| s.info())).await;
        match status {
            Some(status) => infos.into_iter().filter(|i| i.status == status).collect(),
            None => infos,
        }
    }

    pub async fn stop_sandbox(&self, id: &str) -> bool {
        let Some(sandbox) = self.sandboxes.lock().await.get(id).cloned() else {
            return false;
        };
        let _ = sandbox.stop().await;
        true
    }

    /// Removes `id` from pool membership (if present), stops it
    /// best-effort, cleans it up (guaranteed), then drops it from the map.
    pub async fn delete_sandbox(&self, id: &str) -> bool {
        let Some(sandbox) = self.sandboxes.lock().await.get(id).cloned() else {
            return false;
        };
        self.pool.remove(id).await;
        let _ = sandbox.stop().await;
        let _ = sandbox.cleanup().await;
        self.sandboxes.lock().await.remove(id);
        true
    }

    pub async fn execute_tool(
        &self,
        id: &str,
        tool_name: &str,
        params: serde_json::Value,
    ) -> EnclaveResult<ToolResult> {
        let sandbox = self
            .sandboxes
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| EnclaveError::NotFound(format!("sandbox '{id}' not found")))?;
        Ok(sandbox.execute_tool(tool_name, params).await)
    }

    /// Schemas of the tools bound to `id`, in "OpenAI function" shape.
    pub async fn get_sandbox_tools(&self, id: &str) -> EnclaveResult<Vec<serde_json::Value>> {
        let info = self
            .get_sandbox_info(id)
            .await
            .ok_or_else(|| EnclaveError::NotFound(format!("sandbox '{id}' not found")))?;
        Ok(info
            .tools
            .iter()
            .filter_map(|name| self.tool_registry.openai_schema(name).ok())
            .collect())
    }

    /// Serialized drain: snapshot ids, delete each, swallow per-item errors
    /// into a collected list surfaced via `stats()` (§4.3 "cleanup_all_sandboxes").
    pub async fn cleanup_all_sandboxes(&self) {
        let ids: Vec<String> = self.sandboxes.lock().await.keys().cloned().collect();
        let mut errors = Vec::new();
        for id in ids {
            if !self.delete_sandbox(&id).await {
                errors.push(format!("sandbox '{id}' vanished mid-drain"));
            }
        }
        *self.last_cleanup_errors.lock().await = errors;
    }

    // -- warm pool (§4.3.1) --------------------------------------------

    /// Creates `size` sandboxes concurrently and primes the idle FIFO.
    /// Fails with `Config` if already initialized; rolls back all
    /// successfully created members on partial failure and surfaces
    /// `PoolInitError`.
    pub async fn initialize_pool(
        &self,
        size: usize,
        kind: SandboxKind,
        config: AnySandboxConfig,
    ) -> EnclaveResult<()> {
        let mut initialized = self.pool_initialized.lock().await;
        if *initialized {
            return Err(EnclaveError::Config(
                "pool is already initialized".to_string(),
            ));
        }

        let results = join_all((0..size).map(|_| self.create_sandbox(kind, config.clone(), None))).await;

        let mut created = Vec::new();
        let mut first_error = None;
        for result in results {
            match result {
                Ok(id) => created.push(id),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e.to_string());
                    }
                }
            }
        }

        if let Some(reason) = first_error {
            let created_count = created.len();
            for id in &created {
                self.delete_sandbox(id).await;
            }
            return Err(EnclaveError::PoolInit {
                requested: size,
                created: created_count,
                reason,
            });
        }

        for id in created {
            if let Some(sandbox) = self.sandboxes.lock().await.get(&id).cloned() {
                self.pool.add_idle(sandbox).await;
            }
        }

        *self.pool_template.lock().await = Some(PoolTemplate { kind, config });
        *initialized = true;
        tracing::info!(size, "pool initialized");
        Ok(())
    }

    /// Lease protocol per §4.3.1: pop the oldest idle member (waiting up to
    /// `timeout`), run the tool outside the pool lock, then return the
    /// sandbox to idle if it's still healthy or replace it if not.
    ///
    /// The lease is wrapped in a [`PoolLeaseGuard`] so that cancelling the
    /// caller's future (e.g. the `execute_tool_in_pool` future is dropped
    /// inside a `select!` or an outer timeout) still restores the pool
    /// invariant (§5: "a granted lease whose caller is cancelled mid-
    /// execution still returns the sandbox to idle on unwind") — a Rust
    /// `Drop` guard standing in for the source's `try/finally`.
    pub async fn execute_tool_in_pool(
        self: &Arc<Self>,
        tool_name: &str,
        params: serde_json::Value,
        timeout: Option<Duration>,
    ) -> EnclaveResult<ToolResult> {
        let timeout = timeout.unwrap_or(Duration::from_secs(30));
        let sandbox = self.pool.lease(timeout).await?;
        let mut guard = PoolLeaseGuard::new(self.clone(), sandbox.clone());

        let result = sandbox.execute_tool(tool_name, params).await;

        guard.release_normally().await;

        Ok(result)
    }

    /// Returns a leased sandbox to idle if it's still `Running`, or tears
    /// it down and asynchronously replaces it otherwise. Shared by the
    /// normal-completion path and [`PoolLeaseGuard`]'s cancellation path.
    async fn return_or_replace_pool_member(&self, sandbox: Arc<dyn Sandbox>) {
        if sandbox.status().await == SandboxStatus::Running {
            self.pool.release(sandbox).await;
        } else {
            let dead_id = sandbox.id().to_string();
            self.pool.forget_busy(&dead_id).await;
            self.sandboxes.lock().await.remove(&dead_id);
            let _ = sandbox.cleanup().await;
            self.replace_pool_member().await;
        }
    }

    async fn replace_pool_member(&self) {
        let Some(template) = self.pool_template.lock().await.as_ref().map(|t| (t.kind, t.config.clone())) else {
            return;
        };
        match self.create_sandbox(template.0, template.1, None).await {
            Ok(id) => {
                if let Some(sandbox) = self.sandboxes.lock().await.get(&id).cloned() {
                    self.pool.add_idle(sandbox).await;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to replace dead pool member");
            }
        }
    }

    pub async fn stats(&self) -> ManagerStats {
        let mut by_status = HashMap::new();
        for info in self.list_sandboxes(None).await {
            *by_status.entry(ManagerStats::status_key(info.status).to_string()).or_insert(0) += 1;
        }
        let total = self.sandboxes.lock().await.len();
        ManagerStats {
            by_status,
            total,
            pool: PoolStats {
                size: self.pool.idle_len().await + self.pool.busy_len().await,
                idle: self.pool.idle_len().await,
                busy: self.pool.busy_len().await,
                initialized: *self.pool_initialized.lock().await,
            },
            uptime_secs: self.started_at.elapsed().as_secs(),
            cleanup_interval_secs: self.config.cleanup_interval_secs,
            last_janitor_run: *self.last_janitor_run.lock().await,
            last_cleanup_errors: self.last_cleanup_errors.lock().await.clone(),
        }
    }

    // -- janitor hooks (pub(crate): only `janitor::spawn`'s task calls these) --

    pub(crate) async fn sweep_once(&self) {
        let snapshot: Vec<(String, SandboxStatus, DateTime<Utc>)> = {
            let sandboxes = self.sandboxes.lock().await;
            join_all(sandboxes.values().map(|s| async {
                let info = s.info().await;
                (info.id, info.status, info.last_used)
            }))
            .await
        };

        let idle_ttl = self.config.idle_ttl_secs.map(Duration::from_secs);
        let now = Utc::now();

        for (id, status, last_used) in snapshot {
            // Busy pool members are never touched; idle pool members are
            // exempt from TTL reaping (§4.3.2 step 3).
            if self.pool.is_busy(&id).await {
                continue;
            }
            let in_pool = self.pool.contains(&id).await;

            if status.is_reclaimable() {
                self.delete_sandbox(&id).await;
                continue;
            }

            if in_pool {
                continue;
            }

            if let Some(ttl) = idle_ttl {
                let idle_for = now.signed_duration_since(last_used);
                if idle_for.to_std().unwrap_or_default() > ttl {
                    self.delete_sandbox(&id).await;
                }
            }
        }

        *self.last_janitor_run.lock().await = Some(now);
    }
}

/// Guarantees a leased pool sandbox is returned (or replaced) exactly once,
/// even if the future driving [`LocalManager::execute_tool_in_pool`] is
/// dropped before it reaches its own release call. Mirrors the
/// `try/finally` the source uses around its lease-execute-release sequence:
/// `release_normally` is the happy path, `Drop` is the unwind path, and
/// both funnel into the same `return_or_replace_pool_member` so the pool
/// never double-releases or leaks a busy slot.
struct PoolLeaseGuard {
    manager: Arc<LocalManager>,
    sandbox: Option<Arc<dyn Sandbox>>,
}

impl PoolLeaseGuard {
    fn new(manager: Arc<LocalManager>, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            manager,
            sandbox: Some(sandbox),
        }
    }

    /// Disarms the guard and runs the return-or-replace path inline, on the
    /// normal (not-cancelled) completion path.
    async fn release_normally(&mut self) {
        if let Some(sandbox) = self.sandbox.take() {
            self.manager.return_or_replace_pool_member(sandbox).await;
        }
    }
}

impl Drop for PoolLeaseGuard {
    fn drop(&mut self) {
        if let Some(sandbox) = self.sandbox.take() {
            let manager = self.manager.clone();
            tokio::spawn(async move {
                manager.return_or_replace_pool_member(sandbox).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::SandboxConfig;

    fn manager_with_dummy() -> Arc<LocalManager> {
        let mut sandbox_registry = SandboxRegistry::new();
        sandbox_registry.register(SandboxKind::Dummy, |config, id| {
            Ok(Arc::new(crate::sandbox::dummy::DummySandbox::new(config, id))
                as Arc<dyn Sandbox>)
        });
        LocalManager::new(
            sandbox_registry,
            ToolRegistry::with_builtins(),
            SandboxManagerConfig::default(),
        )
    }

    fn dummy_config() -> AnySandboxConfig {
        AnySandboxConfig::Dummy(SandboxConfig::default())
    }

    #[tokio::test]
    async fn create_then_get_then_delete() {
        let manager = manager_with_dummy();
        let id = manager
            .create_sandbox(SandboxKind::Dummy, dummy_config(), None)
            .await
            .unwrap();

        let info = manager.get_sandbox_info(&id).await.unwrap();
        assert_eq!(info.status, SandboxStatus::Running);

        assert!(manager.delete_sandbox(&id).await);
        assert!(manager.get_sandbox_info(&id).await.is_none());
    }

    #[tokio::test]
    async fn delete_twice_second_call_is_false() {
        let manager = manager_with_dummy();
        let id = manager
            .create_sandbox(SandboxKind::Dummy, dummy_config(), None)
            .await
            .unwrap();
        assert!(manager.delete_sandbox(&id).await);
        assert!(!manager.delete_sandbox(&id).await);
    }

    #[tokio::test]
    async fn stop_on_unknown_id_is_false() {
        let manager = manager_with_dummy();
        assert!(!manager.stop_sandbox("does-not-exist").await);
    }

    #[tokio::test]
    async fn execute_tool_on_unknown_id_is_not_found() {
        let manager = manager_with_dummy();
        let result = manager
            .execute_tool("does-not-exist", "shell_executor", serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(EnclaveError::NotFound(_))));
    }

    #[tokio::test]
    async fn cleanup_all_is_a_fixed_point() {
        let manager = manager_with_dummy();
        manager
            .create_sandbox(SandboxKind::Dummy, dummy_config(), None)
            .await
            .unwrap();
        manager.cleanup_all_sandboxes().await;
        assert!(manager.list_sandboxes(None).await.is_empty());
        manager.cleanup_all_sandboxes().await;
        assert!(manager.list_sandboxes(None).await.is_empty());
    }

    #[tokio::test]
    async fn pool_lease_fifo_reuses_released_id() {
        let manager = manager_with_dummy();
        manager.initialize_pool(2, SandboxKind::Dummy, dummy_config()).await.unwrap();

        let first = manager.pool.lease(Duration::from_secs(1)).await.unwrap();
        let first_id = first.id().to_string();
        let second = manager.pool.lease(Duration::from_secs(1)).await.unwrap();
        manager.pool.release(first).await;

        let third = manager.pool.lease(Duration::from_secs(1)).await.unwrap();
        assert_eq!(third.id(), first_id);
        manager.pool.release(second).await;
        manager.pool.release(third).await;
    }

    #[tokio::test]
    async fn initialize_pool_twice_is_config_error() {
        let manager = manager_with_dummy();
        manager.initialize_pool(1, SandboxKind::Dummy, dummy_config()).await.unwrap();
        let result = manager.initialize_pool(1, SandboxKind::Dummy, dummy_config()).await;
        assert!(matches!(result, Err(EnclaveError::Config(_))));
    }

    #[tokio::test]
    async fn pool_lease_timeout_on_empty_pool() {
        let manager = manager_with_dummy();
        manager.initialize_pool(1, SandboxKind::Dummy, dummy_config()).await.unwrap();
        let _held = manager.pool.lease(Duration::from_secs(1)).await.unwrap();
        let result = manager
            .execute_tool_in_pool("shell_executor", serde_json::json!({}), Some(Duration::from_millis(10)))
            .await;
        assert!(matches!(result, Err(EnclaveError::Timeout(_))));
    }

    /// Simulates the caller's `execute_tool_in_pool` future being cancelled
    /// after the lease was granted but before it reached `release_normally`
    /// — e.g. a `select!` arm elsewhere firing first, or an outer timeout.
    /// The guard's `Drop` must still return the sandbox to idle (§5).
    #[tokio::test]
    async fn pool_lease_guard_drop_without_release_returns_sandbox_to_idle() {
        let manager = manager_with_dummy();
        manager
            .initialize_pool(1, SandboxKind::Dummy, dummy_config())
            .await
            .unwrap();

        let sandbox = manager.pool.lease(Duration::from_secs(1)).await.unwrap();
        assert_eq!(manager.pool.idle_len().await, 0);
        assert_eq!(manager.pool.busy_len().await, 1);

        {
            let _guard = PoolLeaseGuard::new(manager.clone(), sandbox);
            // Dropped here without calling `release_normally`.
        }

        // The guard's `Drop` spawns the recovery onto the runtime; give it
        // a turn before asserting.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(manager.pool.idle_len().await, 1);
        assert_eq!(manager.pool.busy_len().await, 0);
    }
}
