//! Tool contract and registry (§4.1).
//!
//! A [`Tool`] is a named, stateless descriptor: a JSON-Schema-shaped
//! parameter descriptor, a declared required [`SandboxKind`], and an
//! `execute` operation that consumes a sandbox context injected by the
//! sandbox that owns it. The registry only constructs tools — it never runs
//! them; execution always goes through [`crate::sandbox::Sandbox::execute_tool`]
//! so the concrete sandbox can inject its engine handle.
//!
//! Per the "global registries -> explicit tables" design note, the registry
//! is a plain value built with [`ToolRegistry::with_builtins`] and passed
//! into the manager, not an ambient singleton — tests can substitute a
//! registry with a subset of tools or fakes.

pub mod file_operation;
pub mod notebook_executor;
pub mod python_executor;
pub mod shell_executor;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{EnclaveError, EnclaveResult};
use crate::model::{SandboxKind, ToolResult};
use crate::sandbox::Sandbox;

/// A named, stateless, schema-described operation executable within a
/// sandbox context.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique, stable tool name (the registry key).
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// The sandbox kind this tool requires. A sandbox refuses to bind a
    /// tool whose `required_kind` doesn't match its own kind (§3 invariant 6).
    fn required_kind(&self) -> SandboxKind;

    /// JSON-Schema-shaped parameter descriptor (`type: "object"`, `properties`,
    /// `required`), used both for `ToolRegistry::schema` and for the
    /// "OpenAI function" shape returned by `ToolRegistry::openai_schema`.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Run the tool against the sandbox that bound it.
    async fn execute(&self, ctx: &dyn Sandbox, params: serde_json::Value) -> ToolResult;
}

type ToolFactory = Arc<dyn Fn() -> Arc<dyn Tool> + Send + Sync>;

/// Process-wide (by convention, not enforcement) table of tool factories,
/// keyed by name. Construct with [`ToolRegistry::with_builtins`] and pass by
/// reference into sandboxes and the manager.
pub struct ToolRegistry {
    factories: HashMap<&'static str, ToolFactory>,
}

impl ToolRegistry {
    /// An empty registry with no tools registered.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry pre-populated with the four built-in tools (§4.1).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("python_executor", || {
                Arc::new(python_executor::PythonExecutor) as Arc<dyn Tool>
            })
            .expect("built-in tool names are unique");
        registry
            .register("shell_executor", || {
                Arc::new(shell_executor::ShellExecutor) as Arc<dyn Tool>
            })
            .expect("built-in tool names are unique");
        registry
            .register("file_operation", || {
                Arc::new(file_operation::FileOperation) as Arc<dyn Tool>
            })
            .expect("built-in tool names are unique");
        registry
            .register("notebook_executor", || {
                Arc::new(notebook_executor::NotebookExecutor) as Arc<dyn Tool>
            })
            .expect("built-in tool names are unique");
        registry
    }

    /// Registers a tool factory under `name`. Fails with `ConfigError` if the
    /// name is already taken — registration is process-wide and duplicate
    /// names are a configuration mistake, not a runtime race.
    pub fn register<F>(&mut self, name: &'static str, factory: F) -> EnclaveResult<()>
    where
        F: Fn() -> Arc<dyn Tool> + Send + Sync + 'static,
    {
        if self.factories.contains_key(name) {
            return Err(EnclaveError::Config(format!(
                "tool '{name}' is already registered"
            )));
        }
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Constructs a fresh tool instance by name.
    pub fn create(&self, name: &str) -> EnclaveResult<Arc<dyn Tool>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| EnclaveError::NotFound(format!("tool '{name}' is not registered")))?;
        Ok(factory())
    }

    /// Names of all registered tools, in no particular order.
    pub fn list(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// The tool's parameter schema in "OpenAI function" shape:
    /// `{"name", "description", "parameters"}`.
    pub fn openai_schema(&self, name: &str) -> EnclaveResult<serde_json::Value> {
        let tool = self.create(name)?;
        Ok(serde_json::json!({
            "name": tool.name(),
            "description": tool.description(),
            "parameters": tool.parameters_schema(),
        }))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_builtins_registers_all_four() {
        let registry = ToolRegistry::with_builtins();
        let mut names = registry.list();
        names.sort_unstable();
        assert_eq!(
            names,
            vec![
                "file_operation",
                "notebook_executor",
                "python_executor",
                "shell_executor",
            ]
        );
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = ToolRegistry::with_builtins();
        let result = registry.register("python_executor", || {
            Arc::new(python_executor::PythonExecutor) as Arc<dyn Tool>
        });
        assert!(matches!(result, Err(EnclaveError::Config(_))));
    }

    #[test]
    fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::with_builtins();
        assert!(matches!(
            registry.create("does-not-exist"),
            Err(EnclaveError::NotFound(_))
        ));
    }

    #[test]
    fn openai_schema_shape() {
        let registry = ToolRegistry::with_builtins();
        let schema = registry.openai_schema("shell_executor").unwrap();
        assert_eq!(schema["name"], "shell_executor");
        assert!(schema["parameters"]["properties"]["command"].is_object());
    }
}
