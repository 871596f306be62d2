//! # enclave
//!
//! A managed service for running untrusted code in isolated container
//! sandboxes, with a uniform tool-invocation surface on top: shell commands,
//! file operations, Python execution, and notebook (Jupyter kernel-gateway)
//! execution all go through the same [`tools::Tool`] contract regardless of
//! which sandbox kind backs them.
//!
//! ## Architecture
//!
//! ### Model ([`model`])
//!
//! Wire and domain types shared by every other module: [`model::SandboxKind`],
//! [`model::SandboxStatus`], [`model::SandboxInfo`], [`model::CommandSpec`],
//! [`model::CommandResult`], [`model::ToolResult`], plus the per-kind
//! configuration types in [`model::config`].
//!
//! ### Sandboxes ([`sandbox`])
//!
//! A sandbox is a leased, stateful execution environment. Each kind
//! implements the [`sandbox::Sandbox`] trait:
//!
//! - [`sandbox::dummy::DummySandbox`] - an in-process fake, for tests
//! - [`sandbox::container::ContainerSandbox`] - a Docker container via `bollard`
//! - [`sandbox::notebook::NotebookSandbox`] - a container running a Jupyter
//!   kernel gateway, with commands submitted over its websocket protocol
//!   instead of `docker exec`
//!
//! [`sandbox::SandboxRegistry`] is the factory table handed to
//! [`manager::LocalManager`] at construction time: a plain value, not an
//! ambient singleton.
//!
//! ### Tools ([`tools`])
//!
//! Tools translate a structured call (name + JSON parameters) into a
//! [`model::CommandSpec`] run against a bound sandbox, implementing the
//! [`tools::Tool`] trait. [`tools::ToolRegistry::with_builtins`] registers
//! the four built-ins: `python_executor`, `shell_executor`, `file_operation`,
//! `notebook_executor`.
//!
//! ### Manager ([`manager`])
//!
//! [`manager::LocalManager`] is the orchestration core: sandbox lifecycle,
//! the warm pool ([`manager::pool::SandboxPool`]), the background reaper
//! ([`manager::janitor`]), and aggregate stats ([`manager::stats`]).
//!
//! ### HTTP boundary ([`server`], [`client`])
//!
//! [`server::router`] exposes [`manager::LocalManager`] over HTTP for
//! out-of-process callers; [`client::HttpClientManager`] is the matching
//! thin client, translating the same method surface into one HTTP round
//! trip per call.
//!
//! ### Configuration ([`config`])
//!
//! TOML configuration for the `enclaved` binary. See [`config::Config`].

pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod model;
pub mod sandbox;
pub mod server;
pub mod tools;

pub use error::{EnclaveError, EnclaveResult};
pub use manager::LocalManager;
pub use model::{CommandResult, CommandSpec, SandboxInfo, SandboxKind, SandboxStatus, ToolResult};
pub use sandbox::{Sandbox, SandboxRegistry};
pub use tools::{Tool, ToolRegistry};
