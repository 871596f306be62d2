//! Plain container sandbox (C5): create, start, exec, stop, remove via
//! `bollard`. Grounded in the teacher's `provider/docker.rs`, generalized
//! from the teacher's single "keep the container running with `sleep
//! infinity`" case to the configurable image/command/resource surface in
//! `ContainerSandboxConfig`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use tokio::sync::Mutex;

use crate::error::{EnclaveError, EnclaveResult};
use crate::model::config::ContainerSandboxConfig;
use crate::model::{CommandResult, CommandSpec, ExecutionStatus, SandboxInfo, SandboxKind, SandboxStatus};
use crate::sandbox::{Sandbox, SandboxCore};
use crate::tools::{Tool, ToolRegistry};

/// A sandbox backed by a single Docker/OCI container, kept alive with
/// `sleep infinity` so `exec` can be called repeatedly against it.
pub struct ContainerSandbox {
    core: SandboxCore,
    docker: Docker,
    config: ContainerSandboxConfig,
    container_id: Mutex<Option<String>>,
}

impl ContainerSandbox {
    pub fn new(docker: Docker, config: ContainerSandboxConfig, id: Option<String>) -> Self {
        Self {
            core: SandboxCore::with_id(id, SandboxKind::Container),
            docker,
            config,
            container_id: Mutex::new(None),
        }
    }

    async fn container_id(&self) -> EnclaveResult<String> {
        self.container_id
            .lock()
            .await
            .clone()
            .ok_or_else(|| EnclaveError::Engine("container is not running".to_string()))
    }

    async fn ensure_image(&self) -> EnclaveResult<()> {
        if self.docker.inspect_image(&self.config.image).await.is_ok() {
            return Ok(());
        }
        tracing::info!(image = %self.config.image, "pulling image");
        let mut stream = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: self.config.image.clone(),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(chunk) = stream.next().await {
            chunk.map_err(|e| {
                EnclaveError::ImageUnavailable(format!("{}: {e}", self.config.image))
            })?;
        }
        Ok(())
    }

    async fn create_and_start_container(&self) -> EnclaveResult<String> {
        let mut env: Vec<String> = self
            .config
            .base
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        env.sort();

        let binds: Vec<String> = self
            .config
            .volumes
            .iter()
            .map(|(host, mount)| format!("{host}:{}:{}", mount.bind, mount.mode))
            .collect();

        let port_bindings = (!self.config.ports.is_empty()).then(|| {
            self.config
                .ports
                .iter()
                .map(|(container_port, publish)| {
                    (
                        container_port.clone(),
                        Some(vec![bollard::models::PortBinding {
                            host_ip: Some(publish.host.clone()),
                            host_port: Some(publish.port.to_string()),
                        }]),
                    )
                })
                .collect()
        });

        let mut host_config = HostConfig {
            binds: (!binds.is_empty()).then_some(binds),
            port_bindings,
            privileged: Some(self.config.privileged),
            ..Default::default()
        };
        if !self.config.network_enabled {
            host_config.network_mode = Some("none".to_string());
        } else if let Some(network) = &self.config.network {
            host_config.network_mode = Some(network.clone());
        }
        if let Some(cpu) = self.config.cpu_limit {
            host_config.cpu_period = Some(100_000);
            host_config.cpu_quota = Some((cpu * 100_000.0) as i64);
        }
        if let Some(memory) = &self.config.memory_limit {
            host_config.memory = Some(parse_memory_limit(memory));
        }

        let cmd = self
            .config
            .command
            .clone()
            .unwrap_or_else(|| vec!["sleep".to_string(), "infinity".to_string()]);

        let container_config = ContainerConfig {
            image: Some(self.config.image.clone()),
            env: Some(env),
            working_dir: self.config.base.working_dir.clone(),
            cmd: Some(cmd),
            host_config: Some(host_config),
            tty: Some(true),
            exposed_ports: (!self.config.ports.is_empty()).then(|| {
                self.config
                    .ports
                    .keys()
                    .map(|port| (port.clone(), std::collections::HashMap::new()))
                    .collect()
            }),
            ..Default::default()
        };

        let name = format!("sandbox-{}", self.core.id);
        let options = CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| EnclaveError::SandboxStart(format!("create container: {e}")))?;

        self.docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| EnclaveError::SandboxStart(format!("start container: {e}")))?;

        Ok(response.id)
    }

    async fn wait_running(&self, container_id: &str) -> EnclaveResult<()> {
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            let inspect = self
                .docker
                .inspect_container(container_id, None)
                .await
                .map_err(|e| EnclaveError::SandboxStart(format!("inspect container: {e}")))?;
            if matches!(
                inspect.state.and_then(|s| s.status),
                Some(bollard::models::ContainerStateStatusEnum::RUNNING)
            ) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(EnclaveError::SandboxStart(
                    "container failed to reach running state within 30s".to_string(),
                ));
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Brings the container up to a running engine state without binding any
    /// tools. Used directly by the trait's `start`, and by
    /// [`super::notebook::NotebookSandbox`], which binds container-kind and
    /// notebook-kind tools separately against the two sandboxes' own cores.
    pub(crate) async fn start_container(&self) -> EnclaveResult<()> {
        self.ensure_image().await?;
        let container_id = self.create_and_start_container().await?;
        *self.container_id.lock().await = Some(container_id.clone());
        self.core
            .metadata
            .lock()
            .await
            .insert("container_id".to_string(), container_id.clone());
        self.wait_running(&container_id).await
    }

    /// Binds tools against this container's own core (kind `Container`).
    pub(crate) async fn bind_tools(
        &self,
        registry: &ToolRegistry,
        tool_names: impl IntoIterator<Item = &str>,
    ) -> EnclaveResult<()> {
        self.core.bind_tools(registry, tool_names).await
    }
}

fn parse_memory_limit(spec: &str) -> i64 {
    let spec = spec.trim().to_lowercase();
    let (digits, multiplier) = if let Some(n) = spec.strip_suffix('g') {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = spec.strip_suffix('m') {
        (n, 1024 * 1024)
    } else if let Some(n) = spec.strip_suffix('k') {
        (n, 1024)
    } else {
        (spec.as_str(), 1)
    };
    digits.trim().parse::<i64>().unwrap_or(0) * multiplier
}

#[async_trait]
impl Sandbox for ContainerSandbox {
    fn id(&self) -> &str {
        &self.core.id
    }

    fn kind(&self) -> SandboxKind {
        SandboxKind::Container
    }

    async fn status(&self) -> SandboxStatus {
        *self.core.status.lock().await
    }

    async fn info(&self) -> SandboxInfo {
        self.core.info().await
    }

    async fn start(&self, registry: &ToolRegistry) -> EnclaveResult<()> {
        self.core.set_status(SandboxStatus::Initializing).await;

        let result: EnclaveResult<()> = async {
            self.start_container().await?;

            let names: Vec<&str> = self
                .config
                .base
                .tools_config
                .keys()
                .map(String::as_str)
                .collect();
            self.bind_tools(registry, names).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.core.set_status(SandboxStatus::Running).await;
                tracing::info!(id = %self.core.id, "container sandbox started");
                Ok(())
            }
            Err(e) => {
                self.core.set_error(e.to_string()).await;
                tracing::error!(id = %self.core.id, error = %e, "container sandbox failed to start");
                Err(e)
            }
        }
    }

    async fn execute_command(
        &self,
        command: CommandSpec,
        timeout: Option<Duration>,
    ) -> CommandResult {
        self.core.touch().await;
        let display = command.display();
        let timeout = timeout.unwrap_or(Duration::from_secs(self.config.base.timeout_secs));

        let run = async {
            let container_id = self.container_id().await.map_err(|e| e.to_string())?;

            let exec_cmd = match &command {
                CommandSpec::Shell(s) => vec!["/bin/sh".to_string(), "-c".to_string(), s.clone()],
                CommandSpec::Argv(args) => args.clone(),
            };

            let exec_options = CreateExecOptions {
                cmd: Some(exec_cmd),
                working_dir: self.config.base.working_dir.clone(),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                ..Default::default()
            };

            let exec = self
                .docker
                .create_exec(&container_id, exec_options)
                .await
                .map_err(|e| e.to_string())?;

            let output = self
                .docker
                .start_exec(&exec.id, None)
                .await
                .map_err(|e| e.to_string())?;

            let mut stdout = String::new();
            let mut stderr = String::new();
            if let StartExecResults::Attached { mut output, .. } = output {
                while let Some(msg) = output.next().await {
                    match msg {
                        Ok(LogOutput::StdOut { message }) => {
                            stdout.push_str(&String::from_utf8_lossy(&message))
                        }
                        Ok(LogOutput::StdErr { message }) => {
                            stderr.push_str(&String::from_utf8_lossy(&message))
                        }
                        _ => {}
                    }
                }
            }

            let inspect = self
                .docker
                .inspect_exec(&exec.id)
                .await
                .map_err(|e| e.to_string())?;
            let exit_code = inspect.exit_code.unwrap_or(-1) as i32;

            Ok::<(i32, String, String), String>((exit_code, stdout, stderr))
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(Ok((exit_code, stdout, stderr))) => CommandResult {
                command: display,
                status: if exit_code == 0 {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Error
                },
                exit_code,
                stdout,
                stderr,
            },
            Ok(Err(reason)) => CommandResult {
                command: display,
                status: ExecutionStatus::Error,
                exit_code: -1,
                stdout: String::new(),
                stderr: reason,
            },
            Err(_) => CommandResult {
                command: display,
                status: ExecutionStatus::Timeout,
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("command timed out after {}s", timeout.as_secs()),
            },
        }
    }

    async fn bound_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.core.bound_tool(name).await
    }

    async fn stop(&self) -> EnclaveResult<()> {
        self.core.set_status(SandboxStatus::Stopping).await;
        let Some(container_id) = self.container_id.lock().await.clone() else {
            self.core.set_status(SandboxStatus::Stopped).await;
            return Ok(());
        };
        // 10s grace per §4.2 "Stop".
        match self
            .docker
            .stop_container(&container_id, Some(StopContainerOptions { t: 10 }))
            .await
        {
            Ok(()) => {
                self.core.set_status(SandboxStatus::Stopped).await;
                Ok(())
            }
            Err(e) => {
                let reason = format!("stopping container: {e}");
                self.core.set_error(reason.clone()).await;
                Err(EnclaveError::Engine(reason))
            }
        }
    }

    async fn cleanup(&self) -> EnclaveResult<()> {
        let Some(container_id) = self.container_id.lock().await.take() else {
            return Ok(());
        };
        // 5s grace for the stop path per §4.2 "Cleanup".
        let result = if self.config.remove_on_exit {
            self.docker
                .remove_container(
                    &container_id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await
        } else {
            self.docker
                .stop_container(&container_id, Some(StopContainerOptions { t: 5 }))
                .await
        };
        if let Err(e) = result {
            tracing::warn!(id = %self.core.id, error = %e, "error during container cleanup");
        }
        self.core.set_status(SandboxStatus::Cleanup).await;
        Ok(())
    }
}
