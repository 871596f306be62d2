//! HTTP client manager (C8): a thin drop-in for [`crate::manager::LocalManager`]
//! that translates each method into one HTTP call against the server (C9)
//! in spec.md §6. Grounded in the teacher's `provider/remote.rs` (a
//! `reqwest::Client`-backed `SandboxProvider` that mirrors the local
//! provider's contract over HTTP) — the same "remote stands in for local"
//! shape, generalized from a provider to a full manager surface. Holds no
//! authoritative state itself; every call is a round trip (§4.5).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EnclaveError, EnclaveResult};
use crate::manager::stats::ManagerStats;
use crate::model::config::AnySandboxConfig;
use crate::model::{SandboxInfo, SandboxKind, SandboxStatus, ToolResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote stand-in for [`crate::manager::LocalManager`]: same method
/// surface, each call a single HTTP round trip against a running
/// `enclaved` server. Holds one pooled `reqwest::Client` (§4.5: "a single
/// pooled HTTP connection").
pub struct HttpClientManager {
    base_url: String,
    http: reqwest::Client,
}

impl HttpClientManager {
    /// `base_url` should not have a trailing slash, e.g. `http://localhost:8088`.
    pub fn new(base_url: impl Into<String>) -> EnclaveResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| EnclaveError::Config(format!("building HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> EnclaveResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;
        if !response.status().is_success() {
            return Err(status_to_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| EnclaveError::Engine(format!("decoding response: {e}")))
    }

    pub async fn create_sandbox(
        &self,
        kind: SandboxKind,
        config: AnySandboxConfig,
        id: Option<String>,
    ) -> EnclaveResult<String> {
        #[derive(Serialize)]
        struct Body {
            kind: SandboxKind,
            config: AnySandboxConfig,
            id: Option<String>,
        }
        #[derive(Deserialize)]
        struct Resp {
            id: String,
        }
        let resp: Resp = self
            .send_json(self.http.post(self.url("/sandboxes")).json(&Body { kind, config, id }))
            .await?;
        Ok(resp.id)
    }

    pub async fn get_sandbox_info(&self, id: &str) -> EnclaveResult<Option<SandboxInfo>> {
        let response = self
            .http
            .get(self.url(&format!("/sandboxes/{id}")))
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_to_error(response).await);
        }
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| EnclaveError::Engine(format!("decoding response: {e}")))
    }

    pub async fn list_sandboxes(
        &self,
        status: Option<SandboxStatus>,
    ) -> EnclaveResult<Vec<SandboxInfo>> {
        let mut request = self.http.get(self.url("/sandboxes"));
        if let Some(status) = status {
            request = request.query(&[("status", status)]);
        }
        self.send_json(request).await
    }

    pub async fn stop_sandbox(&self, id: &str) -> EnclaveResult<bool> {
        self.bool_post(&format!("/sandboxes/{id}/stop")).await
    }

    pub async fn delete_sandbox(&self, id: &str) -> EnclaveResult<bool> {
        let response = self
            .http
            .delete(self.url(&format!("/sandboxes/{id}")))
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(status_to_error(response).await);
        }
        Ok(true)
    }

    async fn bool_post(&self, path: &str) -> EnclaveResult<bool> {
        let response = self
            .http
            .post(self.url(path))
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(status_to_error(response).await);
        }
        Ok(true)
    }

    pub async fn execute_tool(
        &self,
        id: &str,
        tool_name: &str,
        params: serde_json::Value,
    ) -> EnclaveResult<ToolResult> {
        #[derive(Serialize)]
        struct Body {
            parameters: serde_json::Value,
        }
        self.send_json(
            self.http
                .post(self.url(&format!("/sandboxes/{id}/tools/{tool_name}")))
                .json(&Body { parameters: params }),
        )
        .await
    }

    pub async fn get_sandbox_tools(&self, id: &str) -> EnclaveResult<Vec<serde_json::Value>> {
        self.send_json(self.http.get(self.url(&format!("/sandboxes/{id}/tools"))))
            .await
    }

    pub async fn initialize_pool(
        &self,
        size: usize,
        kind: SandboxKind,
        config: AnySandboxConfig,
    ) -> EnclaveResult<()> {
        #[derive(Serialize)]
        struct Body {
            size: usize,
            kind: SandboxKind,
            config: AnySandboxConfig,
        }
        let response = self
            .http
            .post(self.url("/pool/init"))
            .json(&Body { size, kind, config })
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;
        if !response.status().is_success() {
            return Err(status_to_error(response).await);
        }
        Ok(())
    }

    pub async fn execute_tool_in_pool(
        &self,
        tool_name: &str,
        params: serde_json::Value,
        timeout: Option<Duration>,
    ) -> EnclaveResult<ToolResult> {
        #[derive(Serialize)]
        struct Body {
            parameters: serde_json::Value,
            timeout: Option<u64>,
        }
        self.send_json(
            self.http
                .post(self.url(&format!("/pool/tools/{tool_name}")))
                .json(&Body {
                    parameters: params,
                    timeout: timeout.map(|d| d.as_secs()),
                }),
        )
        .await
    }

    pub async fn stats(&self) -> EnclaveResult<ManagerStats> {
        self.send_json(self.http.get(self.url("/stats"))).await
    }
}

fn map_transport_error(error: &reqwest::Error) -> EnclaveError {
    if error.is_timeout() {
        EnclaveError::Timeout(error.to_string())
    } else {
        EnclaveError::Engine(format!("HTTP transport error: {error}"))
    }
}

async fn status_to_error(response: reqwest::Response) -> EnclaveError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        reqwest::StatusCode::NOT_FOUND => EnclaveError::NotFound(body),
        reqwest::StatusCode::BAD_REQUEST => EnclaveError::Config(body),
        reqwest::StatusCode::SERVICE_UNAVAILABLE => EnclaveError::PoolExhausted(body),
        reqwest::StatusCode::GATEWAY_TIMEOUT => EnclaveError::Timeout(body),
        _ => EnclaveError::Engine(format!("server returned {status}: {body}")),
    }
}
