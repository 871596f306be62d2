//! `file_operation` — read, write, append, delete, or list a path inside the
//! sandbox, dispatched through the sandbox's own command execution rather
//! than a dedicated upload/download engine call, so it works uniformly
//! across sandbox kinds.

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{CommandSpec, ExecutionStatus, SandboxKind, ToolResult};
use crate::sandbox::Sandbox;
use crate::tools::Tool;

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum Operation {
    Read,
    Write,
    Append,
    Delete,
    List,
}

#[derive(Deserialize)]
struct Params {
    operation: Operation,
    file_path: String,
    content: Option<String>,
}

pub struct FileOperation;

#[async_trait]
impl Tool for FileOperation {
    fn name(&self) -> &'static str {
        "file_operation"
    }

    fn description(&self) -> &'static str {
        "Read, write, append, delete, or list a path inside the sandbox"
    }

    fn required_kind(&self) -> SandboxKind {
        SandboxKind::Container
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": { "type": "string", "enum": ["read", "write", "append", "delete", "list"] },
                "file_path": { "type": "string", "description": "Absolute or working-dir-relative path" },
                "content": { "type": "string", "description": "Content to write/append (required for write|append)" },
            },
            "required": ["operation", "file_path"],
        })
    }

    async fn execute(&self, ctx: &dyn Sandbox, params: serde_json::Value) -> ToolResult {
        let params: Params = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(self.name(), format!("invalid parameters: {e}")),
        };

        let cmd = match params.operation {
            Operation::Read => CommandSpec::Argv(vec!["cat".to_string(), params.file_path]),
            Operation::List => CommandSpec::Argv(vec!["ls".to_string(), "-la".to_string(), params.file_path]),
            Operation::Delete => CommandSpec::Argv(vec!["rm".to_string(), "-rf".to_string(), params.file_path]),
            Operation::Write | Operation::Append => {
                let Some(content) = params.content else {
                    return ToolResult::error(
                        self.name(),
                        "content is required for write/append operations",
                    );
                };
                let redirect = match params.operation {
                    Operation::Append => ">>",
                    _ => ">",
                };
                CommandSpec::Shell(format!(
                    "cat {redirect} {} <<'ENCLAVE_EOF'\n{}\nENCLAVE_EOF",
                    shell_quote(&params.file_path),
                    content
                ))
            }
        };

        let result = ctx.execute_command(cmd, None).await;
        let mut tool_result = ToolResult::from_command(self.name(), result);
        if tool_result.status == ExecutionStatus::Success {
            tool_result.error = None;
        }
        tool_result
    }
}

fn shell_quote(path: &str) -> String {
    format!("'{}'", path.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::dummy::DummySandbox;

    #[tokio::test]
    async fn read_builds_cat_argv() {
        let sandbox = DummySandbox::new_for_test();
        let result = FileOperation
            .execute(
                &sandbox,
                serde_json::json!({"operation": "read", "file_path": "/tmp/x.txt"}),
            )
            .await;
        assert_eq!(result.status, ExecutionStatus::Success);
        // DummySandbox's fake echoes the last argv element.
        assert_eq!(result.output, "/tmp/x.txt");
    }

    #[tokio::test]
    async fn list_builds_ls_argv() {
        let sandbox = DummySandbox::new_for_test();
        let result = FileOperation
            .execute(
                &sandbox,
                serde_json::json!({"operation": "list", "file_path": "/tmp"}),
            )
            .await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output, "/tmp");
    }

    #[tokio::test]
    async fn write_without_content_is_rejected() {
        let sandbox = DummySandbox::new_for_test();
        let result = FileOperation
            .execute(
                &sandbox,
                serde_json::json!({"operation": "write", "file_path": "/tmp/x"}),
            )
            .await;
        assert_eq!(result.status, ExecutionStatus::Error);
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected() {
        let sandbox = DummySandbox::new_for_test();
        let result = FileOperation
            .execute(
                &sandbox,
                serde_json::json!({"operation": "rename", "file_path": "/tmp/x"}),
            )
            .await;
        assert_eq!(result.status, ExecutionStatus::Error);
    }
}
