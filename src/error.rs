//! Error taxonomy for the sandbox orchestration layer.
//!
//! Lifecycle methods (`create_sandbox`, `start`, `initialize_pool`, ...) raise
//! [`EnclaveError`] so callers can distinguish setup failures. Execution methods
//! (`execute_command`, `execute_tool`) never raise engine errors — they convert
//! failures into result objects with `status = error | timeout` instead. See
//! [`crate::model::ExecutionStatus`].

/// Errors surfaced by sandbox and manager lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum EnclaveError {
    /// Bad input discovered before any side effects: unknown sandbox kind,
    /// unknown tool name, duplicate pool initialization.
    #[error("configuration error: {0}")]
    Config(String),

    /// An unknown sandbox id or tool name was referenced.
    #[error("not found: {0}")]
    NotFound(String),

    /// The configured image could not be acquired (missing and pull failed).
    #[error("image unavailable: {0}")]
    ImageUnavailable(String),

    /// Container creation, start, or tool binding failed during sandbox start.
    #[error("sandbox failed to start: {0}")]
    SandboxStart(String),

    /// A transient container-engine failure during exec/stop/remove.
    #[error("engine error: {0}")]
    Engine(String),

    /// The tool ran but the sandbox could not produce a result. Distinct from
    /// a tool returning `status = error`, which is an expected outcome.
    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    /// A deadline was reached waiting on an operation, including a pool
    /// lease that found no idle sandbox before its timeout elapsed.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Pool initialization failed partway through; `created` sandboxes were
    /// rolled back.
    #[error("pool initialization failed after creating {created} of {requested}: {reason}")]
    PoolInit {
        requested: usize,
        created: usize,
        reason: String,
    },

    /// Reserved for a pool whose capacity/configuration is itself the
    /// problem (e.g. re-initializing a pool that's already at its bound);
    /// a plain lease timeout on an empty pool is `Timeout`, not this.
    #[error("pool exhausted: {0}")]
    PoolExhausted(String),
}

/// Result alias used throughout the orchestration layer.
pub type EnclaveResult<T> = Result<T, EnclaveError>;
