//! The synchronous "generate an image" operation.
//!
//! [`Orchestrator::generate`] runs bind → submit → wait → retrieve for one
//! request and returns the image bytes or a [`GenerationError`]. The
//! template is loaded once and shared read-only; every request binds onto
//! its own copy, so concurrent calls never observe each other's values.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use fluxgen_comfyui::messages::{ArtifactDescriptor, ModelInventory, QueueSnapshot};
use fluxgen_comfyui::{ComfyUIApi, EngineError, ExecutionEngine, JobHandle};
use fluxgen_core::{bind, resolve_seed, GenerationParams, TaskId, TemplateError, WorkflowTemplate};

use crate::config::{PipelineConfig, TrackerConfig};
use crate::error::GenerationError;
use crate::retriever::{ArtifactRetriever, RetrievalError};
use crate::store::ArtifactStore;
use crate::submitter::JobSubmitter;
use crate::tracker::{CompletionTracker, JobState};

/// A successfully generated image.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutput {
    pub task_id: TaskId,
    pub job: JobHandle,
    /// The concrete seed used, even when a random one was requested.
    pub seed: i64,
    pub elapsed: Duration,
    pub artifact_path: PathBuf,
    pub descriptor: ArtifactDescriptor,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Drives generation requests against one execution engine.
pub struct Orchestrator<E> {
    template: Arc<WorkflowTemplate>,
    engine: Arc<E>,
    submitter: JobSubmitter<E>,
    tracker: CompletionTracker<E>,
    retriever: ArtifactRetriever<E>,
}

impl Orchestrator<ComfyUIApi> {
    /// Load (or create) the template and connect to the configured engine.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, TemplateError> {
        let template = WorkflowTemplate::load_or_create(&config.template_path)?;
        tracing::info!(
            template = template.name(),
            path = %config.template_path.display(),
            api_url = %config.engine.api_url,
            "Workflow template ready",
        );

        Ok(Self::new(
            Arc::new(template),
            Arc::new(ComfyUIApi::new(config.engine.clone())),
            config.tracker,
            ArtifactStore::new(&config.output_dir),
        ))
    }

    /// Model files the engine's loader nodes can select.
    pub async fn available_models(&self) -> Result<ModelInventory, EngineError> {
        self.engine.available_models().await
    }
}

impl<E: ExecutionEngine> Orchestrator<E> {
    pub fn new(
        template: Arc<WorkflowTemplate>,
        engine: Arc<E>,
        tracker: TrackerConfig,
        store: ArtifactStore,
    ) -> Self {
        Self {
            submitter: JobSubmitter::new(Arc::clone(&engine)),
            tracker: CompletionTracker::new(Arc::clone(&engine), tracker),
            retriever: ArtifactRetriever::new(Arc::clone(&engine), store),
            template,
            engine,
        }
    }

    pub fn template(&self) -> &WorkflowTemplate {
        &self.template
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn store(&self) -> &ArtifactStore {
        self.retriever.store()
    }

    /// Generate one image, waiting at most the configured budget.
    pub async fn generate(
        &self,
        params: &GenerationParams,
    ) -> Result<GenerationOutput, GenerationError> {
        self.generate_with_cancel(params, &CancellationToken::new()).await
    }

    /// Like [`generate`](Self::generate), but gives up with
    /// [`GenerationError::Cancelled`] once `cancel` fires. The job is not
    /// cancelled on the engine.
    pub async fn generate_with_cancel(
        &self,
        params: &GenerationParams,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutput, GenerationError> {
        let result = self.run(params, cancel).await;
        if let Err(e) = &result {
            tracing::error!(
                task_id = %params.task_id,
                kind = e.kind(),
                job = ?e.job().map(JobHandle::as_str),
                elapsed_ms = e.elapsed().as_millis() as u64,
                error = %e,
                "Generation failed",
            );
        }
        result
    }

    async fn run(
        &self,
        params: &GenerationParams,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutput, GenerationError> {
        let started = Instant::now();
        let task_id = &params.task_id;
        let seed = resolve_seed(params.seed);

        tracing::info!(
            task_id = %task_id,
            seed,
            width = params.width,
            height = params.height,
            steps = params.steps,
            "Starting generation",
        );

        let graph = bind(&self.template, params, seed);

        let job = self
            .submitter
            .submit(task_id, &graph)
            .await
            .map_err(|e| GenerationError::SubmitFailed {
                reason: e.to_string(),
                elapsed: started.elapsed(),
            })?;

        let report = self.tracker.wait(&job, cancel).await;
        match report.state {
            JobState::Completed => {}
            JobState::Cancelled => {
                return Err(GenerationError::Cancelled {
                    job,
                    elapsed: started.elapsed(),
                });
            }
            JobState::TimedOut | JobState::Pending(_) => {
                return Err(GenerationError::TimedOut {
                    job,
                    elapsed: started.elapsed(),
                    budget: self.tracker.config().budget,
                    polls: report.polls,
                    last_seen: report.last_seen,
                });
            }
        }

        let artifact = self
            .retriever
            .fetch(&job, task_id)
            .await
            .map_err(|e| match e {
                RetrievalError::NotFound(reason) => GenerationError::NotFound {
                    job: job.clone(),
                    elapsed: started.elapsed(),
                    reason,
                },
                RetrievalError::Failed(reason) => GenerationError::RetrievalFailed {
                    job: job.clone(),
                    elapsed: started.elapsed(),
                    reason,
                },
            })?;

        let elapsed = started.elapsed();
        tracing::info!(
            task_id = %task_id,
            job = %job,
            seed,
            polls = report.polls,
            elapsed_ms = elapsed.as_millis() as u64,
            "Generation complete",
        );

        Ok(GenerationOutput {
            task_id: task_id.clone(),
            job,
            seed,
            elapsed,
            artifact_path: artifact.path,
            descriptor: artifact.descriptor,
            bytes: artifact.bytes,
        })
    }

    /// Whether the engine currently answers requests.
    pub async fn check_engine_reachable(&self) -> bool {
        self.engine.is_reachable().await
    }

    pub async fn queue_snapshot(&self) -> Result<QueueSnapshot, EngineError> {
        self.engine.queue().await
    }
}
