//! Semantic slot roles.
//!
//! The binder never addresses nodes by literal ID. Instead, a
//! [`RoleTable`] is resolved once when the template loads by following
//! the graph's wiring from the sampler node, so templates whose nodes are
//! renumbered still bind correctly.

use std::fmt;

use crate::error::TemplateError;
use crate::workflow::{NodeId, WorkflowGraph, KSAMPLER_CLASS, SAVE_IMAGE_CLASS};

/// A parameter slot the binder writes per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotRole {
    PositivePrompt,
    NegativePrompt,
    Seed,
    Steps,
    Guidance,
    Width,
    Height,
    OutputPrefix,
}

impl SlotRole {
    pub const ALL: [SlotRole; 8] = [
        SlotRole::PositivePrompt,
        SlotRole::NegativePrompt,
        SlotRole::Seed,
        SlotRole::Steps,
        SlotRole::Guidance,
        SlotRole::Width,
        SlotRole::Height,
        SlotRole::OutputPrefix,
    ];

    /// Name of the node input that carries this role.
    pub fn input_name(self) -> &'static str {
        match self {
            SlotRole::PositivePrompt | SlotRole::NegativePrompt => "text",
            SlotRole::Seed => "seed",
            SlotRole::Steps => "steps",
            SlotRole::Guidance => "cfg",
            SlotRole::Width => "width",
            SlotRole::Height => "height",
            SlotRole::OutputPrefix => "filename_prefix",
        }
    }
}

impl fmt::Display for SlotRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotRole::PositivePrompt => "positive prompt",
            SlotRole::NegativePrompt => "negative prompt",
            SlotRole::Seed => "seed",
            SlotRole::Steps => "steps",
            SlotRole::Guidance => "guidance",
            SlotRole::Width => "width",
            SlotRole::Height => "height",
            SlotRole::OutputPrefix => "output prefix",
        };
        f.write_str(name)
    }
}

/// Location of a slot inside a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAddress<'a> {
    pub node_id: &'a str,
    pub input: &'static str,
}

/// Sampler inputs that wire in the nodes owning the other roles.
const POSITIVE_INPUT: &str = "positive";
const NEGATIVE_INPUT: &str = "negative";
const LATENT_INPUT: &str = "latent_image";

/// Role → node mapping for one template graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTable {
    sampler: NodeId,
    positive: NodeId,
    negative: NodeId,
    latent: NodeId,
    save: NodeId,
}

impl RoleTable {
    /// Locate every role in `graph`.
    ///
    /// The sampler and save nodes are found by class type and must be
    /// unique. The prompt encoders and latent initialiser are whatever the
    /// sampler's `positive`, `negative` and `latent_image` inputs link to.
    /// Each located node must already carry the input its role writes.
    pub fn resolve(graph: &WorkflowGraph) -> Result<Self, TemplateError> {
        let sampler = unique_node(graph, KSAMPLER_CLASS)?;
        let save = unique_node(graph, SAVE_IMAGE_CLASS)?;
        let positive = linked_node(graph, &sampler, POSITIVE_INPUT, SlotRole::PositivePrompt)?;
        let negative = linked_node(graph, &sampler, NEGATIVE_INPUT, SlotRole::NegativePrompt)?;
        let latent = linked_node(graph, &sampler, LATENT_INPUT, SlotRole::Width)?;

        let table = Self {
            sampler,
            positive,
            negative,
            latent,
            save,
        };

        for role in SlotRole::ALL {
            let address = table.address(role);
            let present = graph
                .node(address.node_id)
                .is_some_and(|node| node.input(address.input).is_some());
            if !present {
                return Err(TemplateError::MissingSlot {
                    node: address.node_id.to_string(),
                    input: address.input,
                });
            }
        }

        Ok(table)
    }

    /// Where `role` lives in the graph this table was resolved from.
    pub fn address(&self, role: SlotRole) -> SlotAddress<'_> {
        let node_id = match role {
            SlotRole::PositivePrompt => &self.positive,
            SlotRole::NegativePrompt => &self.negative,
            SlotRole::Seed | SlotRole::Steps | SlotRole::Guidance => &self.sampler,
            SlotRole::Width | SlotRole::Height => &self.latent,
            SlotRole::OutputPrefix => &self.save,
        };
        SlotAddress {
            node_id,
            input: role.input_name(),
        }
    }
}

fn unique_node(graph: &WorkflowGraph, class_type: &'static str) -> Result<NodeId, TemplateError> {
    let matches: Vec<&str> = graph.nodes_of_class(class_type).collect();
    match matches.as_slice() {
        [] => Err(TemplateError::MissingNode { class_type }),
        [only] => Ok((*only).to_string()),
        many => Err(TemplateError::AmbiguousNode {
            class_type,
            count: many.len(),
        }),
    }
}

fn linked_node(
    graph: &WorkflowGraph,
    sampler: &str,
    input: &str,
    role: SlotRole,
) -> Result<NodeId, TemplateError> {
    let link = graph
        .node(sampler)
        .and_then(|node| node.input(input))
        .and_then(|value| value.as_link())
        .ok_or_else(|| TemplateError::MissingRole {
            role,
            reason: format!("sampler node '{sampler}' has no '{input}' link"),
        })?;

    if graph.node(link.node_id()).is_none() {
        return Err(TemplateError::MissingRole {
            role,
            reason: format!("'{input}' links to missing node '{}'", link.node_id()),
        });
    }

    Ok(link.node_id().to_string())
}
