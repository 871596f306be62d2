//! Configuration schema for the `enclaved` binary.
//!
//! Mirrors the teacher's `OffloadConfig`/`ProviderConfig` split: one root
//! [`Config`] struct with a small top-level table (`[server]`, `[logging]`)
//! plus a nested [`crate::model::config::SandboxManagerConfig`] reused
//! as-is, the same way the teacher nests `ReportConfig`/`ProviderConfig`
//! under its root `Config` rather than inventing a parallel schema.

use serde::{Deserialize, Serialize};

use crate::model::config::SandboxManagerConfig;

/// Root configuration structure for `enclaved`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub manager: SandboxManagerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server bind settings for the C9 HTTP surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8088".to_string()
}

/// Logging verbosity, passed to `tracing_subscriber::EnvFilter` as a
/// default when `RUST_LOG` is unset, same pattern as the teacher's CLI
/// `--verbose` flag feeding into its own `EnvFilter` setup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
