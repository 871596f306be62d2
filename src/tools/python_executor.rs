//! `python_executor` — runs code inside the sandbox's Python interpreter.
//!
//! Implements the direct `python3 -c <code>` form rather than the
//! staged-script JSON-envelope form seen in the original implementation
//! (see DESIGN.md Open Question 2): the contract is "code runs, stdout/
//! stderr/exit are surfaced", and invoking the interpreter directly gets
//! there without writing, and then cleaning up, a file in the sandbox.

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{CommandSpec, ExecutionStatus, SandboxKind, ToolResult};
use crate::sandbox::Sandbox;
use crate::tools::Tool;

#[derive(Deserialize)]
struct Params {
    code: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
}

fn default_timeout() -> u64 {
    30
}

pub struct PythonExecutor;

#[async_trait]
impl Tool for PythonExecutor {
    fn name(&self) -> &'static str {
        "python_executor"
    }

    fn description(&self) -> &'static str {
        "Execute Python code in an isolated sandbox"
    }

    fn required_kind(&self) -> SandboxKind {
        SandboxKind::Container
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": { "type": "string", "description": "Python code to execute" },
                "timeout": { "type": "integer", "description": "Execution timeout in seconds", "default": 30 },
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

        let cmd = CommandSpec::Argv(vec![
            "python3".to_string(),
            "-c".to_string(),
            params.code,
        ]);
        let result = ctx
            .execute_command(cmd, Some(std::time::Duration::from_secs(params.timeout)))
            .await;

        let mut tool_result = ToolResult::from_command(self.name(), result);
        // A non-empty stderr alongside a zero exit code is diagnostic
        // output, not a tool failure — only surface it as `error` when the
        // command actually failed.
        if tool_result.status == ExecutionStatus::Success {
            tool_result.error = None;
        }
        tool_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::dummy::DummySandbox;

    #[tokio::test]
    async fn empty_code_is_rejected() {
        let sandbox = DummySandbox::new_for_test();
        let result = PythonExecutor
            .execute(&sandbox, serde_json::json!({"code": "   "}))
            .await;
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.error.as_deref(), Some("No code provided"));
    }

    #[tokio::test]
    async fn runs_code_via_argv() {
        // DummySandbox's fake executor echoes the last argv element back as
        // stdout, which is enough to confirm the tool builds a `python3 -c
        // <code>` argv and passes the command through unmodified.
        let sandbox = DummySandbox::new_for_test();
        let result = PythonExecutor
            .execute(&sandbox, serde_json::json!({"code": "print(2+2)"}))
            .await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output, "print(2+2)");
    }
}
