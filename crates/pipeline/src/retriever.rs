//! Artifact retrieval: history lookup, download, local persistence.

use std::path::PathBuf;
use std::sync::Arc;

use fluxgen_comfyui::messages::ArtifactDescriptor;
use fluxgen_comfyui::{ExecutionEngine, JobHandle};
use fluxgen_core::TaskId;

use crate::store::ArtifactStore;

/// A downloaded and stored artifact.
#[derive(Debug, Clone)]
pub struct RetrievedArtifact {
    pub bytes: Vec<u8>,
    pub descriptor: ArtifactDescriptor,
    pub path: PathBuf,
}

/// Why retrieval produced no artifact. The orchestrator adds job and
/// timing context when converting to [`GenerationError`](crate::GenerationError).
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// The engine has no artifact for the job.
    #[error("{0}")]
    NotFound(String),

    /// The artifact could not be fetched or persisted.
    #[error("{0}")]
    Failed(String),
}

/// Fetches the first artifact of a finished job and stores it by task id.
pub struct ArtifactRetriever<E> {
    engine: Arc<E>,
    store: ArtifactStore,
}

impl<E: ExecutionEngine> ArtifactRetriever<E> {
    pub fn new(engine: Arc<E>, store: ArtifactStore) -> Self {
        Self { engine, store }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub async fn fetch(
        &self,
        job: &JobHandle,
        task_id: &TaskId,
    ) -> Result<RetrievedArtifact, RetrievalError> {
        let entry = self
            .engine
            .history(job)
            .await
            .map_err(|e| RetrievalError::Failed(format!("history lookup failed: {e}")))?
            .ok_or_else(|| RetrievalError::NotFound("job is absent from engine history".into()))?;

        let descriptor = match entry.first_artifact() {
            Some(descriptor) => descriptor.clone(),
            None => {
                let reason = entry
                    .failure_detail()
                    .unwrap_or_else(|| "no node recorded an output file".into());
                tracing::warn!(job = %job, reason = %reason, "No artifact in job history");
                return Err(RetrievalError::NotFound(reason));
            }
        };

        let filename = &descriptor.filename;
        let bytes = self
            .engine
            .view(&descriptor)
            .await
            .map_err(|e| RetrievalError::Failed(format!("download of '{filename}' failed: {e}")))?;
        if bytes.is_empty() {
            return Err(RetrievalError::Failed(format!(
                "engine returned an empty body for '{filename}'"
            )));
        }

        let path = self
            .store
            .write(task_id, &descriptor, &bytes)
            .await
            .map_err(|e| RetrievalError::Failed(format!("failed to store artifact: {e}")))?;

        tracing::info!(
            job = %job,
            task_id = %task_id,
            filename = %descriptor.filename,
            bytes = bytes.len(),
            path = %path.display(),
            "Artifact retrieved",
        );

        Ok(RetrievedArtifact {
            bytes,
            descriptor,
            path,
        })
    }
}
