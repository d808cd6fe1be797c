//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission, queue inspection, history lookup and
//! artifact download using [`reqwest`], and implements
//! [`ExecutionEngine`] on top of them.

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::engine::{EngineError, ExecutionEngine, JobHandle};
use crate::messages::{
    ArtifactDescriptor, HistoryEntry, HistoryResponse, ModelInventory, QueueSnapshot,
    SubmitResponse,
};

/// HTTP client for a single ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    config: EngineConfig,
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling across multiple instances).
    pub fn with_client(client: reqwest::Client, config: EngineConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /prompt` with the workflow and this client's ID.
    /// Returns the server-assigned `prompt_id` and queue position.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
    ) -> Result<SubmitResponse, EngineError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": self.config.client_id,
        });

        let response = self
            .client
            .post(self.url("/prompt"))
            .timeout(self.config.submit_timeout)
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the running and pending queue lists (`GET /queue`).
    pub async fn get_queue(&self) -> Result<QueueSnapshot, EngineError> {
        let response = self
            .client
            .get(self.url("/queue"))
            .timeout(self.config.poll_timeout)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends `GET /history/{prompt_id}`. The engine answers `{}` for IDs it
    /// does not know, which maps to `None`.
    pub async fn get_history(&self, prompt_id: &str) -> Result<Option<HistoryEntry>, EngineError> {
        let response = self
            .client
            .get(self.url(&format!("/history/{prompt_id}")))
            .timeout(self.config.history_timeout)
            .send()
            .await?;

        let mut history: HistoryResponse = Self::parse_response(response).await?;
        Ok(history.remove(prompt_id))
    }

    /// Download an artifact (`GET /view?filename=&subfolder=&type=`).
    pub async fn download(&self, artifact: &ArtifactDescriptor) -> Result<Vec<u8>, EngineError> {
        let response = self
            .client
            .get(self.url("/view"))
            .timeout(self.config.download_timeout)
            .query(&[
                ("filename", artifact.filename.as_str()),
                ("subfolder", artifact.subfolder.as_str()),
                ("type", artifact.kind.as_str()),
            ])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let expected = response.content_length();
        let bytes = response.bytes().await?;

        if let Some(expected) = expected {
            if bytes.len() as u64 != expected {
                return Err(EngineError::Malformed(format!(
                    "artifact body truncated: got {} of {expected} bytes",
                    bytes.len()
                )));
            }
        }

        Ok(bytes.to_vec())
    }

    /// List the model files the loader nodes can select (`GET /object_info`).
    pub async fn available_models(&self) -> Result<ModelInventory, EngineError> {
        let response = self
            .client
            .get(self.url("/object_info"))
            .timeout(self.config.history_timeout)
            .send()
            .await?;

        let info: serde_json::Value = Self::parse_response(response).await?;
        Ok(ModelInventory::from_object_info(&info))
    }

    /// Whether the engine answers `GET /queue` with a success status
    /// within the short status timeout.
    pub async fn check_status(&self) -> bool {
        let result = self
            .client
            .get(self.url("/queue"))
            .timeout(self.config.status_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(
                    api_url = %self.config.api_url,
                    status = response.status().as_u16(),
                    "ComfyUI status check returned non-success",
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    api_url = %self.config.api_url,
                    error = %e,
                    "ComfyUI unreachable",
                );
                false
            }
        }
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url, path)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`EngineError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(EngineError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, EngineError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ExecutionEngine for ComfyUIApi {
    async fn submit(&self, workflow: &serde_json::Value) -> Result<JobHandle, EngineError> {
        let response = self.submit_workflow(workflow).await?;
        if response.prompt_id.is_empty() {
            return Err(EngineError::Malformed(
                "submission accepted without a prompt_id".to_string(),
            ));
        }
        tracing::debug!(
            prompt_id = %response.prompt_id,
            queue_number = response.number,
            "Workflow queued on ComfyUI",
        );
        Ok(JobHandle::new(response.prompt_id))
    }

    async fn queue(&self) -> Result<QueueSnapshot, EngineError> {
        self.get_queue().await
    }

    async fn history(&self, job: &JobHandle) -> Result<Option<HistoryEntry>, EngineError> {
        self.get_history(job.as_str()).await
    }

    async fn view(&self, artifact: &ArtifactDescriptor) -> Result<Vec<u8>, EngineError> {
        self.download(artifact).await
    }

    async fn is_reachable(&self) -> bool {
        self.check_status().await
    }
}
