use std::path::PathBuf;

use crate::roles::SlotRole;

/// A workflow template could not be loaded or is structurally unusable.
///
/// Every variant is fatal: the process cannot serve generation requests
/// without a valid template, so callers should not retry.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to read or write template at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Template version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Template graph must contain at least one node")]
    Empty,

    #[error("Node '{node}' input '{input}' references missing node '{target}'")]
    DanglingReference {
        node: String,
        input: String,
        target: String,
    },

    #[error("Template graph contains a cycle through node '{node}'")]
    Cycle { node: String },

    #[error("Template has no '{class_type}' node")]
    MissingNode { class_type: &'static str },

    #[error("Template has {count} '{class_type}' nodes, expected exactly one")]
    AmbiguousNode {
        class_type: &'static str,
        count: usize,
    },

    #[error("Cannot locate the {role} slot: {reason}")]
    MissingRole { role: SlotRole, reason: String },

    #[error("Node '{node}' is missing required input '{input}'")]
    MissingSlot { node: String, input: &'static str },
}

/// Caller-supplied generation parameters were rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("Invalid task identifier '{0}': use 1-128 ASCII letters, digits, '-' or '_'")]
    InvalidTaskId(String),
}
