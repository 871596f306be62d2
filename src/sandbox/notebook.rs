//! Container sandbox extended with a Jupyter kernel gateway channel (C6).
//!
//! Grounded in the original's `docker_notebook.py`: build-if-absent the
//! vendored kernel-gateway image, wait for the HTTP liveness endpoint, open
//! a kernel via `POST /api/kernels`, then connect a websocket to
//! `/api/kernels/{id}/channels` for `execute_request`/`execute_reply`
//! traffic. Reuses [`super::container::ContainerSandbox`] for the container
//! lifecycle the way the original's `JupyterDockerSandbox` subclasses
//! `DockerSandbox` — composition here, since Rust has no subclassing.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bollard::image::BuildImageOptions;
use bollard::Docker;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{EnclaveError, EnclaveResult};
use crate::model::config::NotebookSandboxConfig;
use crate::model::{CommandResult, CommandSpec, ExecutionStatus, SandboxInfo, SandboxKind, SandboxStatus};
use crate::sandbox::container::ContainerSandbox;
use crate::sandbox::{Sandbox, SandboxCore};
use crate::tools::{Tool, ToolRegistry};

const DOCKERFILE: &str = "FROM python:3.12-slim\n\
RUN pip install --no-cache-dir jupyter_kernel_gateway jupyter_client\n\
EXPOSE 8888\n\
CMD [\"jupyter\", \"kernelgateway\", \"--KernelGatewayApp.ip=0.0.0.0\", \
\"--KernelGatewayApp.port=8888\", \"--KernelGatewayApp.allow_origin=*\"]\n";

struct KernelChannel {
    kernel_id: String,
    ws: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
}

pub struct NotebookSandbox {
    core: SandboxCore,
    container: ContainerSandbox,
    config: NotebookSandboxConfig,
    docker: Docker,
    base_url: String,
    channel: Mutex<Option<KernelChannel>>,
}

impl NotebookSandbox {
    pub fn new(docker: Docker, config: NotebookSandboxConfig, id: Option<String>) -> Self {
        let base_url = format!("http://{}:{}", config.host, config.port);
        let core = SandboxCore::with_id(id.clone(), SandboxKind::ContainerNotebook);
        Self {
            container: ContainerSandbox::new(docker.clone(), config.container.clone(), id),
            core,
            config,
            docker,
            base_url,
            channel: Mutex::new(None),
        }
    }

    async fn build_image_if_absent(&self) -> EnclaveResult<()> {
        let image = &self.config.container.image;
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }
        tracing::info!(%image, "building kernel gateway image");

        let mut archive = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(DOCKERFILE.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        archive
            .append_data(&mut header, "Dockerfile", DOCKERFILE.as_bytes())
            .map_err(|e| EnclaveError::SandboxStart(format!("building Dockerfile tar: {e}")))?;
        let tar_bytes = archive
            .into_inner()
            .map_err(|e| EnclaveError::SandboxStart(format!("building Dockerfile tar: {e}")))?;

        let mut stream = self.docker.build_image(
            BuildImageOptions {
                dockerfile: "Dockerfile".to_string(),
                t: image.clone(),
                rm: true,
                ..Default::default()
            },
            None,
            Some(tar_bytes.into()),
        );
        while let Some(chunk) = stream.next().await {
            let info = chunk.map_err(|e| EnclaveError::SandboxStart(format!("image build: {e}")))?;
            if let Some(stream_log) = info.stream {
                tracing::debug!(%image, "docker build: {}", stream_log.trim());
            }
            if let Some(error) = info.error {
                return Err(EnclaveError::SandboxStart(format!("image build: {error}")));
            }
        }
        Ok(())
    }

    async fn wait_for_gateway(&self) -> EnclaveResult<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            let probe = client
                .get(format!("{}/api/kernels", self.base_url))
                .timeout(Duration::from_secs(1))
                .send()
                .await;
            if matches!(&probe, Ok(resp) if resp.status().is_success()) {
                tracing::info!("kernel gateway is ready");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(EnclaveError::SandboxStart(
                    "kernel gateway failed to become ready within 30s".to_string(),
                ));
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn open_kernel_channel(&self) -> EnclaveResult<()> {
        let client = reqwest::Client::new();
        let response = client
            .post(format!("{}/api/kernels", self.base_url))
            .send()
            .await
            .map_err(|e| EnclaveError::SandboxStart(format!("creating kernel: {e}")))?;
        if !response.status().is_success() {
            return Err(EnclaveError::SandboxStart(format!(
                "creating kernel: gateway returned {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EnclaveError::SandboxStart(format!("parsing kernel response: {e}")))?;
        let kernel_id = body["id"]
            .as_str()
            .ok_or_else(|| EnclaveError::SandboxStart("kernel response had no id".to_string()))?
            .to_string();

        let ws_url = format!(
            "ws://{}:{}/api/kernels/{}/channels",
            self.config.host, self.config.port, kernel_id
        );
        let (ws, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .map_err(|e| EnclaveError::SandboxStart(format!("connecting kernel channel: {e}")))?;

        tracing::info!(%kernel_id, "kernel channel connected");
        *self.channel.lock().await = Some(KernelChannel { kernel_id, ws });
        Ok(())
    }

    /// Sends `code` as an `execute_request` and collects stream/error
    /// content from `execute_reply`/`stream`/`error` messages until the
    /// kernel reports `status: idle` for this request.
    async fn run_in_kernel(&self, code: &str) -> Result<(String, String, bool), String> {
        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or("kernel channel is not open")?;

        let msg_id = uuid::Uuid::new_v4().simple().to_string();
        let request = json!({
            "header": {
                "msg_id": msg_id,
                "msg_type": "execute_request",
                "version": "5.3",
            },
            "parent_header": {},
            "metadata": {},
            "content": {
                "code": code,
                "silent": false,
                "store_history": true,
                "user_expressions": {},
                "allow_stdin": false,
            },
            "channel": "shell",
        });

        channel
            .ws
            .send(Message::Text(request.to_string()))
            .await
            .map_err(|e| e.to_string())?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut ok = true;

        loop {
            let Some(msg) = channel.ws.next().await else {
                return Err("kernel channel closed unexpectedly".to_string());
            };
            let msg = msg.map_err(|e| e.to_string())?;
            let Message::Text(text) = msg else { continue };
            let parsed: serde_json::Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if parsed["parent_header"]["msg_id"] != json!(msg_id) {
                continue;
            }
            match parsed["msg_type"].as_str() {
                Some("stream") => {
                    let text = parsed["content"]["text"].as_str().unwrap_or_default();
                    if parsed["content"]["name"] == json!("stderr") {
                        stderr.push_str(text);
                    } else {
                        stdout.push_str(text);
                    }
                }
                Some("error") => {
                    ok = false;
                    let traceback = parsed["content"]["traceback"]
                        .as_array()
                        .map(|frames| {
                            frames
                                .iter()
                                .filter_map(|f| f.as_str())
                                .collect::<Vec<_>>()
                                .join("\n")
                        })
                        .unwrap_or_default();
                    stderr.push_str(&traceback);
                }
                Some("execute_result") | Some("display_data") => {
                    if let Some(text) = parsed["content"]["data"]["text/plain"].as_str() {
                        stdout.push_str(text);
                    }
                }
                Some("status") if parsed["content"]["execution_state"] == json!("idle") => {
                    break;
                }
                _ => {}
            }
        }

        Ok((stdout, stderr, ok))
    }
}

#[async_trait]
impl Sandbox for NotebookSandbox {
    fn id(&self) -> &str {
        &self.core.id
    }

    fn kind(&self) -> SandboxKind {
        SandboxKind::ContainerNotebook
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
            self.build_image_if_absent().await?;
            self.container.start_container().await?;
            self.wait_for_gateway().await?;
            self.open_kernel_channel().await?;

            // A notebook sandbox is two `SandboxCore`s wearing one trunk:
            // container-kind tools (e.g. `shell_executor`) bind against the
            // inner `ContainerSandbox`'s own core, while notebook-kind tools
            // (`notebook_executor`) bind against this sandbox's core — each
            // tool's `required_kind()` must match the core that binds it
            // (§3 invariant 6).
            let mut container_tools = Vec::new();
            let mut notebook_tools = Vec::new();
            for name in self.config.container.base.tools_config.keys() {
                match registry.create(name) {
                    Ok(tool) if tool.required_kind() == SandboxKind::ContainerNotebook => {
                        notebook_tools.push(name.as_str())
                    }
                    _ => container_tools.push(name.as_str()),
                }
            }
            self.container.bind_tools(registry, container_tools).await?;
            self.core.bind_tools(registry, notebook_tools).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.core.set_status(SandboxStatus::Running).await;
                Ok(())
            }
            Err(e) => {
                self.core.set_error(e.to_string()).await;
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
        let timeout =
            timeout.unwrap_or(Duration::from_secs(self.config.container.base.timeout_secs));
        let code = match &command {
            CommandSpec::Shell(s) => s.clone(),
            CommandSpec::Argv(args) => args.join(" "),
        };

        match tokio::time::timeout(timeout, self.run_in_kernel(&code)).await {
            Ok(Ok((stdout, stderr, ok))) => CommandResult {
                command: display,
                status: if ok {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Error
                },
                exit_code: if ok { 0 } else { 1 },
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
                stderr: format!("kernel execution timed out after {}s", timeout.as_secs()),
            },
        }
    }

    async fn bound_tool(&self, name: &str) -> Option<std::sync::Arc<dyn Tool>> {
        if let Some(tool) = self.core.bound_tool(name).await {
            return Some(tool);
        }
        self.container.bound_tool(name).await
    }

    async fn stop(&self) -> EnclaveResult<()> {
        self.core.set_status(SandboxStatus::Stopping).await;
        match self.container.stop().await {
            Ok(()) => {
                self.core.set_status(SandboxStatus::Stopped).await;
                Ok(())
            }
            Err(e) => {
                self.core.set_error(e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn cleanup(&self) -> EnclaveResult<()> {
        if let Some(mut channel) = self.channel.lock().await.take() {
            let _ = channel.ws.close(None).await;
            let client = reqwest::Client::new();
            let _ = client
                .delete(format!("{}/api/kernels/{}", self.base_url, channel.kernel_id))
                .send()
                .await;
        }
        self.container.cleanup().await?;
        self.core.set_status(SandboxStatus::Cleanup).await;
        Ok(())
    }
}
