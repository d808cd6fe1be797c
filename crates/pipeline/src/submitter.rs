//! Hands bound workflows to the engine.

use std::sync::Arc;

use fluxgen_comfyui::{EngineError, ExecutionEngine, JobHandle};
use fluxgen_core::{BoundGraph, TaskId};

/// Submits each bound graph exactly once; there are no retries.
pub struct JobSubmitter<E> {
    engine: Arc<E>,
}

impl<E: ExecutionEngine> JobSubmitter<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    /// Queue `graph` on the engine and return its job handle.
    pub async fn submit(
        &self,
        task_id: &TaskId,
        graph: &BoundGraph,
    ) -> Result<JobHandle, EngineError> {
        let result = match graph.to_json() {
            Ok(workflow) => self.engine.submit(&workflow).await,
            Err(e) => Err(EngineError::from(e)),
        };
        match result {
            Ok(job) => {
                tracing::info!(task_id = %task_id, job = %job, "Workflow submitted");
                Ok(job)
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "Workflow submission failed");
                Err(e)
            }
        }
    }
}
