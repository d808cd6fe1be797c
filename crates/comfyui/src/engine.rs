//! The execution-engine seam.
//!
//! [`ExecutionEngine`] is the submit / queue / history / view contract the
//! generation pipeline drives. [`ComfyUIApi`](crate::api::ComfyUIApi) is
//! the HTTP implementation; tests substitute in-memory engines.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::messages::{ArtifactDescriptor, HistoryEntry, QueueSnapshot};

/// Engine-assigned identifier of one submitted job (the `prompt_id`).
///
/// Only engine implementations construct handles; callers receive them
/// from [`ExecutionEngine::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(prompt_id: impl Into<String>) -> Self {
        Self(prompt_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors from talking to the execution engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The HTTP request itself failed (connect, timeout, truncated body, ...).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The engine returned a non-2xx status code.
    #[error("Engine API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The engine replied with something we could not interpret.
    #[error("Unexpected engine response: {0}")]
    Malformed(String),

    /// The workflow could not be encoded as a request body.
    #[error("Failed to encode workflow: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Submit / poll / fetch interface of an asynchronous graph-execution engine.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Queue a bound workflow document for execution.
    async fn submit(&self, workflow: &serde_json::Value) -> Result<JobHandle, EngineError>;

    /// Current running and pending queue entries.
    async fn queue(&self) -> Result<QueueSnapshot, EngineError>;

    /// Execution history for `job`, or `None` if the engine has no record of it.
    async fn history(&self, job: &JobHandle) -> Result<Option<HistoryEntry>, EngineError>;

    /// Raw bytes of a produced artifact.
    async fn view(&self, artifact: &ArtifactDescriptor) -> Result<Vec<u8>, EngineError>;

    /// Liveness probe; by default, whether a queue request succeeds.
    async fn is_reachable(&self) -> bool {
        self.queue().await.is_ok()
    }
}

#[async_trait]
impl<T: ExecutionEngine + ?Sized> ExecutionEngine for Arc<T> {
    async fn submit(&self, workflow: &serde_json::Value) -> Result<JobHandle, EngineError> {
        (**self).submit(workflow).await
    }

    async fn queue(&self) -> Result<QueueSnapshot, EngineError> {
        (**self).queue().await
    }

    async fn history(&self, job: &JobHandle) -> Result<Option<HistoryEntry>, EngineError> {
        (**self).history(job).await
    }

    async fn view(&self, artifact: &ArtifactDescriptor) -> Result<Vec<u8>, EngineError> {
        (**self).view(artifact).await
    }

    async fn is_reachable(&self) -> bool {
        (**self).is_reachable().await
    }
}
