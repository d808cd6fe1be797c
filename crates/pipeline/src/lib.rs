//! Synchronous image generation over an asynchronous execution engine.
//!
//! Binds a request onto the workflow template, submits it, polls the
//! engine queue until the job leaves it, then downloads and stores the
//! first produced artifact.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod retriever;
pub mod store;
pub mod submitter;
pub mod tracker;

pub use config::{ConfigError, PipelineConfig, TrackerConfig};
pub use error::GenerationError;
pub use orchestrator::{GenerationOutput, Orchestrator};
pub use store::ArtifactStore;
pub use tracker::{JobState, WaitReport};
