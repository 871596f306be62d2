//! `enclaved` - sandbox orchestration service (C7 manager + C9 HTTP server).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use enclave::config;
use enclave::manager::LocalManager;
use enclave::model::config::AnySandboxConfig;
use enclave::model::SandboxKind;
use enclave::sandbox::SandboxRegistry;
use enclave::server;
use enclave::tools::ToolRegistry;

#[derive(Parser)]
#[command(name = "enclaved")]
#[command(about = "Sandbox orchestration service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "enclaved.toml")]
    config: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the manager and HTTP server
    Serve,

    /// Validate a configuration file without starting anything
    Validate,

    /// Write a starter configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve => serve(&cli.config).await,
        Commands::Validate => validate_config(&cli.config),
        Commands::Init => init_config(),
    }
}

async fn serve(config_path: &std::path::Path) -> Result<()> {
    let cfg = config::load_config(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!("loaded configuration from {}", config_path.display());

    let docker = bollard::Docker::connect_with_local_defaults()
        .context("failed to connect to the container engine")?;

    let sandbox_registry = SandboxRegistry::with_builtins(docker);
    let tool_registry = ToolRegistry::with_builtins();
    let manager = LocalManager::new(sandbox_registry, tool_registry, cfg.manager.clone());

    manager
        .start()
        .await
        .context("failed to start the sandbox manager")?;
    info!("sandbox manager started");

    let router = server::router(manager.clone());
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.server.bind_addr))?;
    info!("listening on {}", cfg.server.bind_addr);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    manager
        .stop()
        .await
        .context("failed to stop the sandbox manager cleanly")?;
    info!("sandbox manager stopped");

    Ok(())
}

fn validate_config(config_path: &std::path::Path) -> Result<()> {
    match config::load_config(config_path) {
        Ok(cfg) => {
            println!("Configuration is valid!");
            println!();
            println!("Settings:");
            println!("  Bind address: {}", cfg.server.bind_addr);
            println!("  Cleanup interval: {}s", cfg.manager.cleanup_interval_secs);
            println!("  Default pool size: {}", cfg.manager.default_pool_size);
            if let Some(ttl) = cfg.manager.idle_ttl_secs {
                println!("  Idle TTL: {ttl}s");
            }
            match (&cfg.manager.default_kind, &cfg.manager.default_config) {
                (Some(kind), Some(config)) => {
                    let kind_matches = match (kind, config) {
                        (SandboxKind::Container, AnySandboxConfig::Container(_)) => true,
                        (SandboxKind::ContainerNotebook, AnySandboxConfig::ContainerNotebook(_)) => true,
                        (SandboxKind::Dummy, AnySandboxConfig::Dummy(_)) => true,
                        _ => false,
                    };
                    if !kind_matches {
                        eprintln!(
                            "Warning: manager.default_kind ({kind}) does not match manager.default_config's kind"
                        );
                    }
                    println!("  Default pool kind: {kind}");
                }
                (None, None) => {}
                _ => {
                    eprintln!(
                        "Warning: manager.default_kind and manager.default_config must be set together"
                    );
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    }
}

fn init_config() -> Result<()> {
    let path = PathBuf::from("enclaved.toml");
    if path.exists() {
        eprintln!("enclaved.toml already exists. Remove it first or edit manually.");
        std::process::exit(1);
    }

    let contents = r#"# enclaved configuration file

[server]
bind_addr = "127.0.0.1:8088"

[manager]
cleanup_interval_secs = 60
default_pool_size = 0
# idle_ttl_secs = 300

[logging]
level = "info"
"#;

    std::fs::write(&path, contents)?;
    println!("Created enclaved.toml");
    println!();
    println!("Edit the configuration as needed, then run:");
    println!("  enclaved serve");

    Ok(())
}
