//! Typed records shared by tools, sandboxes, and managers.
//!
//! This module is the data model at the center of the orchestration layer
//! (§3 of the design): closed enumerations for sandbox kind/status/execution
//! outcome, and the plain records (`SandboxInfo`, `CommandResult`,
//! `ToolResult`) that cross every component boundary. Configuration types
//! live in [`config`] to keep the always-small "what happened" records
//! separate from the larger "how to build it" records.

pub mod config;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed enumeration of sandbox implementations.
///
/// Selects both the concrete [`crate::sandbox::Sandbox`] implementation a
/// [`crate::sandbox::SandboxRegistry`] constructs and which tools may be
/// bound to it (a tool's [`crate::tools::Tool::required_kind`] must match).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxKind {
    /// A plain container, reachable via `exec`.
    Container,
    /// A container extended with a long-lived Jupyter kernel gateway.
    ContainerNotebook,
    /// An in-memory sandbox with no engine dependency, used in tests and as
    /// a reference implementation for the `Sandbox` contract.
    Dummy,
}

impl std::fmt::Display for SandboxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SandboxKind::Container => "container",
            SandboxKind::ContainerNotebook => "container-notebook",
            SandboxKind::Dummy => "dummy",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for SandboxKind {
    type Err = crate::error::EnclaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "container" => Ok(SandboxKind::Container),
            "container-notebook" | "container_notebook" => Ok(SandboxKind::ContainerNotebook),
            "dummy" => Ok(SandboxKind::Dummy),
            other => Err(crate::error::EnclaveError::Config(format!(
                "unknown sandbox kind: {other}"
            ))),
        }
    }
}

/// Lifecycle states of a sandbox.
///
/// ```text
///   initializing ──► running ──► stopping ──► stopped
///        │              │            │
///        └──────────────┴────────────┴──► error
///
///   (any non-terminal state) ──► error
///   stopped/error ──► cleanup   (invisible post-removal state)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    /// Being created; not yet accepting tool calls.
    Initializing,
    /// Accepting tool calls.
    Running,
    /// Stop requested, engine confirmation pending.
    Stopping,
    /// Stopped; resources may still be present.
    Stopped,
    /// Unrecoverable failure; the reason is stored in `SandboxInfo::metadata["error"]`.
    Error,
    /// Post-removal marker. Never observed on a sandbox still tracked by a
    /// manager — set only in the brief window between engine teardown and
    /// map removal, and never serialized to the HTTP surface.
    Cleanup,
}

impl SandboxStatus {
    /// Terminal states a janitor sweep reclaims unconditionally.
    pub fn is_reclaimable(self) -> bool {
        matches!(self, SandboxStatus::Error | SandboxStatus::Stopped)
    }
}

/// Outcome of a single command or tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Error,
    Timeout,
    Cancelled,
}

/// Classifies a tool's dispatch path. Only [`ToolType::Sandbox`] tools are
/// implemented by this crate's built-ins (§4.1); the other variants are
/// carried so the registry's introspection surface doesn't need to change
/// shape if a future tool dispatches to a plain function or an external
/// service instead of a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    Sandbox,
    Function,
    External,
}

/// Snapshot of a sandbox's identity and lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxInfo {
    pub id: String,
    pub kind: SandboxKind,
    pub status: SandboxStatus,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    /// Engine container id, error reason, and other small out-of-band facts.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Names of tools bound to this sandbox, if it has started.
    #[serde(default)]
    pub tools: Vec<String>,
}

/// A command to run inside a sandbox: either a shell string or an argv vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSpec {
    Shell(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    /// A human-readable rendering for `CommandResult::command` and logs.
    pub fn display(&self) -> String {
        match self {
            CommandSpec::Shell(s) => s.clone(),
            CommandSpec::Argv(args) => args.join(" "),
        }
    }
}

/// Result of executing a command (shell or argv) inside a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub status: ExecutionStatus,
    /// -1 for failures that never produced an exit code (timeout, engine error).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Result of a tool invocation, returned from [`crate::sandbox::Sandbox::execute_tool`]
/// and from the manager's `execute_tool`/`execute_tool_in_pool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub status: ExecutionStatus,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(tool_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ExecutionStatus::Success,
            output: output.into(),
            error: None,
            metadata: None,
        }
    }

    pub fn error(tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ExecutionStatus::Error,
            output: String::new(),
            error: Some(error.into()),
            metadata: None,
        }
    }

    pub fn from_command(tool_name: impl Into<String>, result: CommandResult) -> Self {
        let status = result.status;
        let error = match status {
            ExecutionStatus::Success => None,
            _ if !result.stderr.is_empty() => Some(result.stderr.clone()),
            ExecutionStatus::Timeout => Some("command timed out".to_string()),
            _ => Some(format!("command exited with code {}", result.exit_code)),
        };
        // A command-level timeout is still a tool-level error: `ToolResult`
        // only distinguishes success/error, matching the tool-boundary
        // propagation policy in the error taxonomy (`EnclaveError` timeouts
        // are a lifecycle concern, not a per-call `ToolResult` status).
        let status = match status {
            ExecutionStatus::Timeout => ExecutionStatus::Error,
            other => other,
        };
        Self {
            tool_name: tool_name.into(),
            status,
            output: result.stdout,
            error,
            metadata: None,
        }
    }
}
