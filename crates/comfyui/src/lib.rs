//! ComfyUI REST client library.
//!
//! Provides the [`ExecutionEngine`] seam used by the generation pipeline,
//! typed views of the engine's queue and history documents, and an HTTP
//! implementation backed by `reqwest`.

pub mod api;
pub mod config;
pub mod engine;
pub mod messages;

pub use api::ComfyUIApi;
pub use config::EngineConfig;
pub use engine::{EngineError, ExecutionEngine, JobHandle};
