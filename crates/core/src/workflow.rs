//! Engine-format workflow graphs.
//!
//! The execution engine accepts a workflow as a JSON object keyed by node
//! ID, where each node carries a `class_type`, a map of named `inputs` and
//! optional `_meta`:
//!
//! ```json
//! {
//!   "3": {
//!     "class_type": "KSampler",
//!     "inputs": { "seed": 42, "positive": ["1", 0] },
//!     "_meta": { "title": "KSampler" }
//!   }
//! }
//! ```
//!
//! An input is either a literal value or a link to another node's output,
//! encoded as a two-element array `[source_node_id, output_index]`.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::TemplateError;

/// Node identifiers are the string keys of the workflow object.
pub type NodeId = String;

// ---------------------------------------------------------------------------
// Node class types referenced by name
// ---------------------------------------------------------------------------

/// Sampler node class type.
pub const KSAMPLER_CLASS: &str = "KSampler";

/// Text encoder node class type.
pub const CLIP_TEXT_ENCODE_CLASS: &str = "CLIPTextEncode";

/// VAE decode node class type.
pub const VAE_DECODE_CLASS: &str = "VAEDecode";

/// Latent initialiser node class type.
pub const EMPTY_LATENT_CLASS: &str = "EmptyLatentImage";

/// Image save node class type.
pub const SAVE_IMAGE_CLASS: &str = "SaveImage";

/// VAE weights loader node class type.
pub const VAE_LOADER_CLASS: &str = "VAELoader";

/// Dual text-encoder loader node class type.
pub const DUAL_CLIP_LOADER_CLASS: &str = "DualCLIPLoader";

/// Diffusion model weights loader node class type.
pub const UNET_LOADER_CLASS: &str = "UNETLoader";

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// Reference to output `1` of node `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef(pub NodeId, pub u32);

impl NodeRef {
    pub fn new(node_id: impl Into<NodeId>, output: u32) -> Self {
        Self(node_id.into(), output)
    }

    pub fn node_id(&self) -> &str {
        &self.0
    }

    pub fn output_index(&self) -> u32 {
        self.1
    }
}

/// Value bound to a named node input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    /// Connection to another node's output.
    Link(NodeRef),
    /// Any other JSON value (text, numbers, model filenames, ...).
    Literal(serde_json::Value),
}

impl InputValue {
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn link(node_id: impl Into<NodeId>, output: u32) -> Self {
        Self::Link(NodeRef::new(node_id, output))
    }

    /// The literal value, or `None` for links.
    pub fn as_literal(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Literal(value) => Some(value),
            Self::Link(_) => None,
        }
    }

    /// The link target, or `None` for literals.
    pub fn as_link(&self) -> Option<&NodeRef> {
        match self {
            Self::Link(node_ref) => Some(node_ref),
            Self::Literal(_) => None,
        }
    }
}

/// Display metadata attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub title: String,
}

/// A single operation in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Engine operation type (e.g. "KSampler", "CLIPTextEncode").
    pub class_type: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputValue>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<NodeMeta>,
}

impl Node {
    pub fn new(class_type: impl Into<String>) -> Self {
        Self {
            class_type: class_type.into(),
            inputs: BTreeMap::new(),
            meta: None,
        }
    }

    /// Builder: set one input.
    pub fn with_input(mut self, name: impl Into<String>, value: InputValue) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    /// Builder: set the display title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.meta = Some(NodeMeta {
            title: title.into(),
        });
        self
    }

    pub fn input(&self, name: &str) -> Option<&InputValue> {
        self.inputs.get(name)
    }

    /// Iterate over `(input_name, link)` pairs for inputs wired to other nodes.
    pub fn links(&self) -> impl Iterator<Item = (&str, &NodeRef)> {
        self.inputs
            .iter()
            .filter_map(|(name, value)| value.as_link().map(|link| (name.as_str(), link)))
    }
}

/// A workflow graph: node ID → node.
///
/// Serializes transparently as the engine's workflow object. Node order
/// is the lexicographic order of IDs, which keeps persisted files stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowGraph {
    nodes: BTreeMap<NodeId, Node>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a node under the given ID, replacing any existing one.
    pub fn with_node(mut self, id: impl Into<NodeId>, node: Node) -> Self {
        self.nodes.insert(id.into(), node);
        self
    }

    pub fn insert(&mut self, id: impl Into<NodeId>, node: Node) -> Option<Node> {
        self.nodes.insert(id.into(), node)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.nodes.iter().map(|(id, node)| (id.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// IDs of all nodes with the given class type, in ID order.
    pub fn nodes_of_class<'a>(&'a self, class_type: &'a str) -> impl Iterator<Item = &'a str> {
        self.nodes
            .iter()
            .filter(move |(_, node)| node.class_type == class_type)
            .map(|(id, _)| id.as_str())
    }

    /// Literal value of `node_id.input`, if both exist and the input is not a link.
    pub fn literal(&self, node_id: &str, input: &str) -> Option<&serde_json::Value> {
        self.node(node_id)?.input(input)?.as_literal()
    }

    /// Check referential integrity and acyclicity.
    ///
    /// Every link must point at a node present in this graph, and the
    /// graph read as edges `source → referring node` must be a DAG.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.nodes.is_empty() {
            return Err(TemplateError::Empty);
        }

        for (id, node) in &self.nodes {
            for (input, link) in node.links() {
                if !self.nodes.contains_key(link.node_id()) {
                    return Err(TemplateError::DanglingReference {
                        node: id.clone(),
                        input: input.to_string(),
                        target: link.node_id().to_string(),
                    });
                }
            }
        }

        self.topological_order().map(|_| ())
    }

    /// Order nodes so that every node follows the nodes it references.
    ///
    /// Uses Kahn's algorithm; ties are broken by node ID. Links to missing
    /// nodes are ignored here, [`validate`](Self::validate) reports them.
    pub fn topological_order(&self) -> Result<Vec<&str>, TemplateError> {
        let mut in_degree: BTreeMap<&str, usize> =
            self.nodes.keys().map(|id| (id.as_str(), 0)).collect();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for (id, node) in &self.nodes {
            for (_, link) in node.links() {
                if let Some((source, _)) = self.nodes.get_key_value(link.node_id()) {
                    dependents
                        .entry(source.as_str())
                        .or_default()
                        .push(id.as_str());
                    *in_degree.entry(id.as_str()).or_default() += 1;
                }
            }
        }

        let mut ready: VecDeque<&str> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            for &dependent in dependents.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let stuck = in_degree
                .iter()
                .find(|&(_, &degree)| degree > 0)
                .map(|(&id, _)| id.to_string())
                .unwrap_or_default();
            return Err(TemplateError::Cycle { node: stuck });
        }

        Ok(order)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
