//! `shell_executor` — runs a shell command inside the sandbox.

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{CommandSpec, SandboxKind, ToolResult};
use crate::sandbox::Sandbox;
use crate::tools::Tool;

#[derive(Deserialize)]
struct Params {
    command: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
}

fn default_timeout() -> u64 {
    30
}

pub struct ShellExecutor;

#[async_trait]
impl Tool for ShellExecutor {
    fn name(&self) -> &'static str {
        "shell_executor"
    }

    fn description(&self) -> &'static str {
        "Run a shell command inside the sandbox"
    }

    fn required_kind(&self) -> SandboxKind {
        SandboxKind::Container
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to run" },
                "timeout": { "type": "integer", "description": "Execution timeout in seconds", "default": 30 },
            },
            "required": ["command"],
        })
    }

    async fn execute(&self, ctx: &dyn Sandbox, params: serde_json::Value) -> ToolResult {
        let params: Params = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(self.name(), format!("invalid parameters: {e}")),
        };

        let result = ctx
            .execute_command(
                CommandSpec::Shell(params.command),
                Some(std::time::Duration::from_secs(params.timeout)),
            )
            .await;
        ToolResult::from_command(self.name(), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExecutionStatus;
    use crate::sandbox::dummy::DummySandbox;

    #[tokio::test(start_paused = true)]
    async fn timeout_yields_error_status_not_panic() {
        let sandbox = DummySandbox::new_for_test();
        let result = ShellExecutor
            .execute(
                &sandbox,
                serde_json::json!({"command": "sleep 5", "timeout": 1}),
            )
            .await;
        assert_eq!(result.status, ExecutionStatus::Error);
    }

    #[tokio::test]
    async fn zero_timeout_times_out() {
        let sandbox = DummySandbox::new_for_test();
        let result = ShellExecutor
            .execute(
                &sandbox,
                serde_json::json!({"command": "sleep 1", "timeout": 0}),
            )
            .await;
        assert_eq!(result.status, ExecutionStatus::Error);
    }
}
