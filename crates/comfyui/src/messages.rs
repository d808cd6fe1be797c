//! ComfyUI REST response documents.
//!
//! Typed views of the JSON returned by `/prompt`, `/queue`,
//! `/history/{prompt_id}` and `/object_info`.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::engine::JobHandle;

/// Reply from `POST /prompt` after the workflow was queued.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: i64,
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// One queue item.
///
/// ComfyUI encodes items as positional arrays
/// `[number, prompt_id, prompt, extra_data, outputs_to_execute]`; only
/// the first two positions are read.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Vec<serde_json::Value>")]
pub struct QueueEntry {
    pub number: Option<i64>,
    pub prompt_id: Option<String>,
}

impl QueueEntry {
    pub fn new(number: i64, prompt_id: impl Into<String>) -> Self {
        Self {
            number: Some(number),
            prompt_id: Some(prompt_id.into()),
        }
    }
}

impl From<Vec<serde_json::Value>> for QueueEntry {
    fn from(items: Vec<serde_json::Value>) -> Self {
        Self {
            number: items.first().and_then(|v| v.as_i64()),
            prompt_id: items.get(1).and_then(|v| v.as_str()).map(str::to_string),
        }
    }
}

/// Where a job sits in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePosition {
    Running,
    /// Zero-based index among pending items.
    Pending(usize),
}

/// Reply from `GET /queue`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub queue_running: Vec<QueueEntry>,
    #[serde(default)]
    pub queue_pending: Vec<QueueEntry>,
}

impl QueueSnapshot {
    /// Locate `job` in the running or pending lists.
    pub fn position(&self, job: &JobHandle) -> Option<QueuePosition> {
        let matches = |entry: &QueueEntry| entry.prompt_id.as_deref() == Some(job.as_str());

        if self.queue_running.iter().any(matches) {
            return Some(QueuePosition::Running);
        }
        self.queue_pending
            .iter()
            .position(matches)
            .map(QueuePosition::Pending)
    }

    pub fn contains(&self, job: &JobHandle) -> bool {
        self.position(job).is_some()
    }

    pub fn running_count(&self) -> usize {
        self.queue_running.len()
    }

    pub fn pending_count(&self) -> usize {
        self.queue_pending.len()
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

fn default_artifact_kind() -> String {
    "output".to_string()
}

/// Location of one produced file inside the engine's storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Storage area: `output`, `temp` or `input`.
    #[serde(rename = "type", default = "default_artifact_kind")]
    pub kind: String,
}

impl ArtifactDescriptor {
    pub fn output(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            subfolder: String::new(),
            kind: default_artifact_kind(),
        }
    }
}

/// Outputs produced by a single node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<ArtifactDescriptor>,
}

/// Engine-reported execution outcome.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionStatus {
    /// `"success"` or `"error"`.
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: bool,
    /// Raw `[event_name, payload]` pairs.
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
}

/// History record of one job, keyed in the reply by its prompt ID.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    /// Node ID → outputs, in the order the engine listed them.
    #[serde(default)]
    pub outputs: IndexMap<String, NodeOutput>,
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
}

impl HistoryEntry {
    /// First artifact of the first listed node that produced any.
    pub fn first_artifact(&self) -> Option<&ArtifactDescriptor> {
        self.outputs
            .values()
            .find_map(|output| output.images.first())
    }

    /// Engine status messages when the engine reported anything but success.
    pub fn failure_detail(&self) -> Option<String> {
        let status = self.status.as_ref()?;
        match status.status_str.as_deref() {
            Some("success") | None => None,
            Some(other) => Some(format!(
                "engine status '{other}': {}",
                serde_json::Value::Array(status.messages.clone())
            )),
        }
    }
}

/// Reply from `GET /history/{prompt_id}`: an object with at most one key.
pub type HistoryResponse = BTreeMap<String, HistoryEntry>;

// ---------------------------------------------------------------------------
// Object info
// ---------------------------------------------------------------------------

/// Selectable model files, as advertised by the loader nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelInventory {
    pub unet: Vec<String>,
    pub vae: Vec<String>,
    pub clip: Vec<String>,
}

impl ModelInventory {
    /// Extract the loader choice lists from a `GET /object_info` reply.
    ///
    /// Each loader advertises `input.required.<field> = [[choices...], {...}]`.
    /// Loaders missing from the reply yield empty lists.
    pub fn from_object_info(info: &serde_json::Value) -> Self {
        let choices = |class: &str, field: &str| -> Vec<String> {
            info.get(class)
                .and_then(|c| c.pointer(&format!("/input/required/{field}/0")))
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };

        Self {
            unet: choices("UNETLoader", "unet_name"),
            vae: choices("VAELoader", "vae_name"),
            clip: choices("DualCLIPLoader", "clip_name1"),
        }
    }
}
