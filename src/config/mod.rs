//! Configuration loading for the `enclaved` binary (§4.0 ambient stack:
//! `toml` + `serde`, mirroring the teacher's `config.rs` + `config/schema.rs`
//! split).

pub mod schema;

pub use schema::Config;

use std::path::Path;

use anyhow::{Context, Result};

/// Loads `enclaved` configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    load_config_str(&content)
}

/// Loads `enclaved` configuration from a TOML string.
pub fn load_config_str(content: &str) -> Result<Config> {
    toml::from_str(content).context("Failed to parse config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_uses_all_defaults() {
        let config = load_config_str("").unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:8088");
        assert_eq!(config.manager.cleanup_interval_secs, 60);
    }

    #[test]
    fn overrides_apply() {
        let config = load_config_str(
            r#"
            [server]
            bind_addr = "0.0.0.0:9000"

            [manager]
            cleanup_interval_secs = 30
            default_pool_size = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.manager.cleanup_interval_secs, 30);
        assert_eq!(config.manager.default_pool_size, 2);
    }
}
