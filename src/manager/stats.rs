//! Manager introspection snapshot, returned by `LocalManager::stats` and
//! exposed over HTTP as `GET /stats` (§4.3.3, §6).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::SandboxStatus;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub size: usize,
    pub idle: usize,
    pub busy: usize,
    pub initialized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerStats {
    /// Sandbox count by lifecycle status, keyed by the status's
    /// `snake_case` rendering (so the HTTP surface gets a flat object).
    pub by_status: HashMap<String, usize>,
    pub total: usize,
    pub pool: PoolStats,
    pub uptime_secs: u64,
    pub cleanup_interval_secs: u64,
    pub last_janitor_run: Option<DateTime<Utc>>,
    /// Errors swallowed during the last `cleanup_all_sandboxes` drain
    /// (§4.3 "collected error list returned in stats").
    #[serde(default)]
    pub last_cleanup_errors: Vec<String>,
}

impl ManagerStats {
    pub fn status_key(status: SandboxStatus) -> &'static str {
        match status {
            SandboxStatus::Initializing => "initializing",
            SandboxStatus::Running => "running",
            SandboxStatus::Stopping => "stopping",
            SandboxStatus::Stopped => "stopped",
            SandboxStatus::Error => "error",
            SandboxStatus::Cleanup => "cleanup",
        }
    }
}
