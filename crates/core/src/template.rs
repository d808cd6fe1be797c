//! Workflow templates.
//!
//! A [`WorkflowTemplate`] is a validated, immutable graph plus the
//! [`RoleTable`] resolved from it. It is loaded once at startup and
//! shared read-only; every request binds against a copy.
//!
//! On disk a template is a versioned envelope:
//!
//! ```json
//! { "version": 1, "name": "flux-dev", "graph": { "1": { ... } } }
//! ```
//!
//! A bare engine-format graph (no envelope) is accepted as well, so
//! workflows exported from the engine can be used directly.

use std::path::Path;

use serde::Serialize;

use crate::error::TemplateError;
use crate::roles::RoleTable;
use crate::workflow::{
    InputValue, Node, WorkflowGraph, CLIP_TEXT_ENCODE_CLASS, DUAL_CLIP_LOADER_CLASS,
    EMPTY_LATENT_CLASS, KSAMPLER_CLASS, SAVE_IMAGE_CLASS, UNET_LOADER_CLASS, VAE_DECODE_CLASS,
    VAE_LOADER_CLASS,
};

/// Template file format version written and accepted by this crate.
pub const TEMPLATE_VERSION: u32 = 1;

/// Name given to the built-in template and to bare graphs loaded from disk.
pub const DEFAULT_TEMPLATE_NAME: &str = "flux-dev";

/// Default diffusion weights file.
pub const DEFAULT_UNET: &str = "flux1-dev-fp8.safetensors";

/// Default VAE weights file.
pub const DEFAULT_VAE: &str = "ae.safetensors";

/// Default text encoder files (CLIP-L and T5-XXL).
pub const DEFAULT_CLIP_L: &str = "clip_l.safetensors";
pub const DEFAULT_T5XXL: &str = "t5xxl_fp16.safetensors";

/// Filename prefix the save node starts with before binding.
pub const DEFAULT_OUTPUT_PREFIX: &str = "flux_output";

/// A validated workflow template.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    name: String,
    graph: WorkflowGraph,
    roles: RoleTable,
}

#[derive(Serialize)]
struct TemplateDocument<'a> {
    version: u32,
    name: &'a str,
    graph: &'a WorkflowGraph,
}

impl WorkflowTemplate {
    /// Validate `graph` and resolve its role table.
    pub fn from_graph(
        name: impl Into<String>,
        graph: WorkflowGraph,
    ) -> Result<Self, TemplateError> {
        graph.validate()?;
        let roles = RoleTable::resolve(&graph)?;
        Ok(Self {
            name: name.into(),
            graph,
            roles,
        })
    }

    /// The built-in text-to-image template.
    pub fn flux_default() -> Result<Self, TemplateError> {
        Self::from_graph(DEFAULT_TEMPLATE_NAME, default_graph())
    }

    /// Parse a template file body (versioned envelope or bare graph).
    pub fn parse(json: &str) -> Result<Self, TemplateError> {
        let value: serde_json::Value = serde_json::from_str(json)?;

        let is_envelope = value
            .as_object()
            .is_some_and(|obj| obj.contains_key("version") && obj.contains_key("graph"));

        if !is_envelope {
            let graph: WorkflowGraph = serde_json::from_value(value)?;
            return Self::from_graph(DEFAULT_TEMPLATE_NAME, graph);
        }

        let version = value["version"]
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0);
        if version != TEMPLATE_VERSION {
            return Err(TemplateError::UnsupportedVersion {
                found: version,
                expected: TEMPLATE_VERSION,
            });
        }

        let name = value["name"]
            .as_str()
            .unwrap_or(DEFAULT_TEMPLATE_NAME)
            .to_string();
        let graph: WorkflowGraph = serde_json::from_value(value["graph"].clone())?;
        Self::from_graph(name, graph)
    }

    /// Load the template at `path`, or materialise and persist the
    /// built-in one if no file exists there yet.
    pub fn load_or_create(path: &Path) -> Result<Self, TemplateError> {
        match std::fs::read_to_string(path) {
            Ok(body) => {
                let template = Self::parse(&body)?;
                tracing::info!(
                    path = %path.display(),
                    name = %template.name,
                    nodes = template.graph.len(),
                    "Loaded workflow template",
                );
                Ok(template)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let template = Self::flux_default()?;
                template.persist(path)?;
                tracing::info!(
                    path = %path.display(),
                    name = %template.name,
                    "Template file absent, wrote built-in template",
                );
                Ok(template)
            }
            Err(source) => Err(TemplateError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Write this template to `path` as a versioned envelope, creating
    /// parent directories as needed.
    pub fn persist(&self, path: &Path) -> Result<(), TemplateError> {
        let io_err = |source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let body = serde_json::to_string_pretty(&TemplateDocument {
            version: TEMPLATE_VERSION,
            name: &self.name,
            graph: &self.graph,
        })?;
        std::fs::write(path, body).map_err(io_err)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }
}

/// The canonical 9-node text-to-image graph.
///
/// Two text encoders feed a sampler whose latent is decoded and saved;
/// the weights, VAE and dual text encoder are loaded by dedicated nodes.
pub fn default_graph() -> WorkflowGraph {
    WorkflowGraph::new()
        .with_node(
            "1",
            Node::new(CLIP_TEXT_ENCODE_CLASS)
                .with_input("text", InputValue::literal("a beautiful landscape"))
                .with_input("clip", InputValue::link("11", 0))
                .with_title("CLIP Text Encode (Prompt)"),
        )
        .with_node(
            "2",
            Node::new(CLIP_TEXT_ENCODE_CLASS)
                .with_input("text", InputValue::literal(""))
                .with_input("clip", InputValue::link("11", 0))
                .with_title("CLIP Text Encode (Negative)"),
        )
        .with_node(
            "3",
            Node::new(KSAMPLER_CLASS)
                .with_input("seed", InputValue::literal(123_456))
                .with_input("steps", InputValue::literal(20))
                .with_input("cfg", InputValue::literal(3.5))
                .with_input("sampler_name", InputValue::literal("euler"))
                .with_input("scheduler", InputValue::literal("simple"))
                .with_input("denoise", InputValue::literal(1))
                .with_input("model", InputValue::link("12", 0))
                .with_input("positive", InputValue::link("1", 0))
                .with_input("negative", InputValue::link("2", 0))
                .with_input("latent_image", InputValue::link("5", 0))
                .with_title("KSampler"),
        )
        .with_node(
            "4",
            Node::new(VAE_DECODE_CLASS)
                .with_input("samples", InputValue::link("3", 0))
                .with_input("vae", InputValue::link("10", 0))
                .with_title("VAE Decode"),
        )
        .with_node(
            "5",
            Node::new(EMPTY_LATENT_CLASS)
                .with_input("width", InputValue::literal(1024))
                .with_input("height", InputValue::literal(1024))
                .with_input("batch_size", InputValue::literal(1))
                .with_title("Empty Latent Image"),
        )
        .with_node(
            "9",
            Node::new(SAVE_IMAGE_CLASS)
                .with_input("filename_prefix", InputValue::literal(DEFAULT_OUTPUT_PREFIX))
                .with_input("images", InputValue::link("4", 0))
                .with_title("Save Image"),
        )
        .with_node(
            "10",
            Node::new(VAE_LOADER_CLASS)
                .with_input("vae_name", InputValue::literal(DEFAULT_VAE))
                .with_title("Load VAE"),
        )
        .with_node(
            "11",
            Node::new(DUAL_CLIP_LOADER_CLASS)
                .with_input("clip_name1", InputValue::literal(DEFAULT_CLIP_L))
                .with_input("clip_name2", InputValue::literal(DEFAULT_T5XXL))
                .with_input("type", InputValue::literal("flux"))
                .with_title("DualCLIPLoader"),
        )
        .with_node(
            "12",
            Node::new(UNET_LOADER_CLASS)
                .with_input("unet_name", InputValue::literal(DEFAULT_UNET))
                .with_input("weight_dtype", InputValue::literal("default"))
                .with_title("Load Diffusion Model"),
        )
}
