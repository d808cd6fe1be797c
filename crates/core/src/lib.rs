//! Workflow templates and parameter binding for text-to-image jobs.
//!
//! Loads (or materialises) the engine workflow template, validates its
//! graph, resolves the semantic slot roles, and binds per-request
//! parameters onto independent copies of the graph.

pub mod binder;
pub mod error;
pub mod params;
pub mod roles;
pub mod template;
pub mod workflow;

pub use binder::{bind, BoundGraph};
pub use error::{ParamError, TemplateError};
pub use params::{resolve_seed, GenerationParams, TaskId, RANDOM_SEED};
pub use roles::{RoleTable, SlotRole};
pub use template::WorkflowTemplate;
pub use workflow::WorkflowGraph;
