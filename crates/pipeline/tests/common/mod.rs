use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use fluxgen_comfyui::messages::{ArtifactDescriptor, HistoryEntry, QueueEntry, QueueSnapshot};
use fluxgen_comfyui::{EngineError, ExecutionEngine, JobHandle};
use fluxgen_core::WorkflowTemplate;
use fluxgen_pipeline::{ArtifactStore, Orchestrator, TrackerConfig};

/// What the engine records for a job once it leaves the queue.
#[derive(Clone)]
#[allow(dead_code)]
pub enum HistoryMode {
    /// One image named after the submitted filename prefix.
    Image,
    /// No history record at all.
    Absent,
    /// Execution error with the given message and no outputs.
    Failed(&'static str),
}

#[derive(Default)]
struct State {
    next_id: u32,
    /// prompt_id -> (filename prefix, queue polls left)
    jobs: HashMap<String, (String, u32)>,
    submissions: Vec<Value>,
    queue_calls: u32,
}

/// In-memory stand-in for a ComfyUI instance.
pub struct FakeEngine {
    reject_with: Option<String>,
    queued_polls: u32,
    history: HistoryMode,
    state: Mutex<State>,
}

#[allow(dead_code)]
impl FakeEngine {
    /// Jobs stay queued for `queued_polls` queue requests, then finish
    /// with one image.
    pub fn new(queued_polls: u32) -> Self {
        Self {
            reject_with: None,
            queued_polls,
            history: HistoryMode::Image,
            state: Mutex::new(State::default()),
        }
    }

    /// Never takes jobs off the queue.
    pub fn stuck() -> Self {
        Self::new(u32::MAX)
    }

    pub fn rejecting(reason: &str) -> Self {
        Self {
            reject_with: Some(reason.to_string()),
            ..Self::new(0)
        }
    }

    pub fn with_history(mut self, history: HistoryMode) -> Self {
        self.history = history;
        self
    }

    pub fn queue_calls(&self) -> u32 {
        self.state.lock().unwrap().queue_calls
    }

    pub fn submissions(&self) -> Vec<Value> {
        self.state.lock().unwrap().submissions.clone()
    }
}

/// First node of `class_type` in a submitted workflow document.
#[allow(dead_code)]
pub fn node_of_class<'a>(workflow: &'a Value, class_type: &str) -> &'a Value {
    workflow
        .as_object()
        .unwrap()
        .values()
        .find(|node| node["class_type"] == class_type)
        .unwrap_or_else(|| panic!("no {class_type} node in workflow"))
}

#[async_trait]
impl ExecutionEngine for FakeEngine {
    async fn submit(&self, workflow: &Value) -> Result<JobHandle, EngineError> {
        if let Some(reason) = &self.reject_with {
            return Err(EngineError::Api {
                status: 400,
                body: reason.clone(),
            });
        }

        let prefix = node_of_class(workflow, "SaveImage")["inputs"]["filename_prefix"]
            .as_str()
            .unwrap()
            .to_string();

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let prompt_id = format!("prompt-{}", state.next_id);
        state
            .jobs
            .insert(prompt_id.clone(), (prefix, self.queued_polls));
        state.submissions.push(workflow.clone());
        Ok(JobHandle::new(prompt_id))
    }

    async fn queue(&self) -> Result<QueueSnapshot, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.queue_calls += 1;

        let mut snapshot = QueueSnapshot::default();
        for (number, (prompt_id, (_, left))) in state.jobs.iter_mut().enumerate() {
            if *left > 0 {
                *left -= 1;
                snapshot
                    .queue_running
                    .push(QueueEntry::new(number as i64, prompt_id.clone()));
            }
        }
        Ok(snapshot)
    }

    async fn history(&self, job: &JobHandle) -> Result<Option<HistoryEntry>, EngineError> {
        let state = self.state.lock().unwrap();
        let Some((prefix, _)) = state.jobs.get(job.as_str()) else {
            return Ok(None);
        };

        let entry = match &self.history {
            HistoryMode::Absent => return Ok(None),
            HistoryMode::Image => json!({
                "outputs": { "9": { "images": [
                    { "filename": format!("{prefix}_00001_.png"), "type": "output" }
                ] } },
                "status": { "status_str": "success", "completed": true, "messages": [] }
            }),
            HistoryMode::Failed(message) => json!({
                "outputs": {},
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [["execution_error", { "exception_message": message }]]
                }
            }),
        };
        Ok(Some(serde_json::from_value(entry).unwrap()))
    }

    async fn view(&self, artifact: &ArtifactDescriptor) -> Result<Vec<u8>, EngineError> {
        Ok(format!("image:{}", artifact.filename).into_bytes())
    }
}

/// Orchestrator over `engine` with the default template.
pub fn orchestrator(
    engine: &Arc<FakeEngine>,
    poll_interval: Duration,
    budget: Duration,
    output_dir: &Path,
) -> Orchestrator<FakeEngine> {
    Orchestrator::new(
        Arc::new(WorkflowTemplate::flux_default().unwrap()),
        Arc::clone(engine),
        TrackerConfig {
            poll_interval,
            budget,
        },
        ArtifactStore::new(output_dir),
    )
}

/// Orchestrator polling every 10 ms within a 5 s budget.
#[allow(dead_code)]
pub fn fast_orchestrator(engine: &Arc<FakeEngine>, output_dir: &Path) -> Orchestrator<FakeEngine> {
    orchestrator(
        engine,
        Duration::from_millis(10),
        Duration::from_secs(5),
        output_dir,
    )
}
