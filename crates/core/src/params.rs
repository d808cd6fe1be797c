//! Per-request generation parameters.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ParamError;

/// Seed value that asks for a fresh random seed.
pub const RANDOM_SEED: i64 = -1;

/// Randomly chosen seeds fall in `[0, SEED_UPPER_BOUND)`.
pub const SEED_UPPER_BOUND: i64 = 1_000_000;

pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 1024;
pub const DEFAULT_STEPS: u32 = 20;
pub const DEFAULT_GUIDANCE_SCALE: f64 = 3.5;

/// Maximum length of a task identifier.
pub const MAX_TASK_ID_LENGTH: usize = 128;

/// Caller-chosen key that namespaces a request's output files.
///
/// Restricted to ASCII alphanumerics, `-` and `_` because it becomes part
/// of file names both on the engine and locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// A fresh random identifier (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn parse(value: impl Into<String>) -> Result<Self, ParamError> {
        let value = value.into();
        if is_safe_task_id(&value) {
            Ok(Self(value))
        } else {
            Err(ParamError::InvalidTaskId(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_safe_task_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_TASK_ID_LENGTH
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TaskId {
    type Error = ParamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

/// Parameters for one text-to-image request.
///
/// Range checks (dimensions, step count, guidance) belong to the caller;
/// the binder only guards the prompt length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance_scale: f64,
    /// [`RANDOM_SEED`] requests a random seed.
    pub seed: i64,
    pub task_id: TaskId,
}

impl GenerationParams {
    /// Parameters with default size, steps, guidance and a random seed.
    pub fn new(prompt: impl Into<String>, task_id: TaskId) -> Self {
        Self {
            prompt: prompt.into(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            steps: DEFAULT_STEPS,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            seed: RANDOM_SEED,
            task_id,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_guidance_scale(mut self, guidance_scale: f64) -> Self {
        self.guidance_scale = guidance_scale;
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }
}

/// Replace [`RANDOM_SEED`] with a random value in `[0, SEED_UPPER_BOUND)`;
/// any other seed is returned unchanged.
pub fn resolve_seed(seed: i64) -> i64 {
    if seed == RANDOM_SEED {
        rand::rng().random_range(0..SEED_UPPER_BOUND)
    } else {
        seed
    }
}
