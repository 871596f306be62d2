//! In-memory sandbox kind with no container engine dependency.
//!
//! `DummySandbox` is a real [`SandboxKind::Dummy`] implementation, not a
//! mock: it tracks the same lifecycle state and bound tools as any other
//! sandbox. Its command executor is a deterministic fake — it echoes the
//! last argv element (or the shell string) back as stdout — except for
//! `sleep`/`sleep N` commands, which really sleep via `tokio::time::sleep`
//! so timeout behavior can be exercised with `tokio::time::pause` instead of
//! real wall-clock delay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::EnclaveResult;
use crate::model::config::{AnySandboxConfig, SandboxConfig};
use crate::model::{CommandResult, CommandSpec, ExecutionStatus, SandboxInfo, SandboxKind, SandboxStatus};
use crate::sandbox::{Sandbox, SandboxCore};
use crate::tools::{Tool, ToolRegistry};

pub struct DummySandbox {
    core: SandboxCore,
    config: SandboxConfig,
}

impl DummySandbox {
    pub fn new(config: AnySandboxConfig, id: Option<String>) -> Self {
        Self {
            core: SandboxCore::with_id(id, SandboxKind::Dummy),
            config: config.base().clone(),
        }
    }

    /// A running dummy sandbox with the built-in tools bound, for use in
    /// tool/manager unit tests that don't exercise `start` itself.
    pub fn new_for_test() -> Self {
        Self::new(AnySandboxConfig::Dummy(SandboxConfig::default()), None)
    }
}

#[async_trait]
impl Sandbox for DummySandbox {
    fn id(&self) -> &str {
        &self.core.id
    }

    fn kind(&self) -> SandboxKind {
        SandboxKind::Dummy
    }

    async fn status(&self) -> SandboxStatus {
        *self.core.status.lock().await
    }

    async fn info(&self) -> SandboxInfo {
        self.core.info().await
    }

    async fn start(&self, registry: &ToolRegistry) -> EnclaveResult<()> {
        let names: Vec<&str> = self
            .config
            .tools_config
            .keys()
            .map(String::as_str)
            .collect();
        self.core.bind_tools(registry, names).await?;
        self.core.set_status(SandboxStatus::Running).await;
        Ok(())
    }

    async fn execute_command(
        &self,
        command: CommandSpec,
        timeout: Option<Duration>,
    ) -> CommandResult {
        self.core.touch().await;
        let display = command.display();

        let run = async {
            match &command {
                CommandSpec::Argv(args) if args.first().map(String::as_str) == Some("sleep") => {
                    sleep_for(args.get(1)).await;
                }
                CommandSpec::Shell(s) if s.trim_start().starts_with("sleep ") => {
                    sleep_for(s.trim_start().strip_prefix("sleep ")).await;
                }
                _ => {}
            }
            let stdout = match &command {
                CommandSpec::Argv(args) => args.last().cloned().unwrap_or_default(),
                CommandSpec::Shell(s) => s.clone(),
            };
            stdout
        };

        let outcome = match timeout {
            Some(d) => tokio::time::timeout(d, run).await,
            None => Ok(run.await),
        };

        match outcome {
            Ok(stdout) => CommandResult {
                command: display,
                status: ExecutionStatus::Success,
                exit_code: 0,
                stdout,
                stderr: String::new(),
            },
            Err(_) => CommandResult {
                command: display,
                status: ExecutionStatus::Timeout,
                exit_code: -1,
                stdout: String::new(),
                stderr: String::new(),
            },
        }
    }

    async fn bound_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.core.bound_tool(name).await
    }

    async fn stop(&self) -> EnclaveResult<()> {
        self.core.set_status(SandboxStatus::Stopping).await;
        self.core.set_status(SandboxStatus::Stopped).await;
        Ok(())
    }

    async fn cleanup(&self) -> EnclaveResult<()> {
        self.core.set_status(SandboxStatus::Cleanup).await;
        Ok(())
    }
}

async fn sleep_for(arg: Option<&String>) {
    let secs: f64 = arg.and_then(|s| s.trim().parse().ok()).unwrap_or(0.0);
    if secs > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_with_no_bound_tools_when_unconfigured() {
        let sandbox = DummySandbox::new_for_test();
        let registry = ToolRegistry::with_builtins();
        sandbox.start(&registry).await.unwrap();
        assert_eq!(sandbox.status().await, SandboxStatus::Running);
        assert!(sandbox.bound_tool("python_executor").await.is_none());
    }

    #[tokio::test]
    async fn echoes_last_argv_element() {
        let sandbox = DummySandbox::new_for_test();
        let result = sandbox
            .execute_command(
                CommandSpec::Argv(vec!["echo".to_string(), "hello".to_string()]),
                None,
            )
            .await;
        assert!(result.success());
        assert_eq!(result.stdout, "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_respects_paused_clock() {
        let sandbox = DummySandbox::new_for_test();
        let result = sandbox
            .execute_command(
                CommandSpec::Argv(vec!["sleep".to_string(), "3600".to_string()]),
                Some(Duration::from_secs(3700)),
            )
            .await;
        assert!(result.success());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_past_timeout_is_reported_as_timeout() {
        let sandbox = DummySandbox::new_for_test();
        let result = sandbox
            .execute_command(
                CommandSpec::Argv(vec!["sleep".to_string(), "10".to_string()]),
                Some(Duration::from_secs(1)),
            )
            .await;
        assert_eq!(result.status, ExecutionStatus::Timeout);
    }

    #[tokio::test]
    async fn stop_then_cleanup_is_idempotent() {
        let sandbox = DummySandbox::new_for_test();
        sandbox.stop().await.unwrap();
        sandbox.cleanup().await.unwrap();
        sandbox.cleanup().await.unwrap();
    }
}
