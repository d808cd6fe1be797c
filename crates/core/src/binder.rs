//! Parameter binding.
//!
//! [`bind`] copies a template's graph and writes the request's values into
//! the slots named by the template's [`RoleTable`](crate::roles::RoleTable).
//! The template itself is never touched, and each bound graph owns its
//! nodes outright, so concurrent requests cannot observe each other.

use std::borrow::Cow;

use serde::Serialize;

use crate::params::{GenerationParams, TaskId};
use crate::roles::SlotRole;
use crate::template::{WorkflowTemplate, DEFAULT_OUTPUT_PREFIX};
use crate::workflow::{InputValue, WorkflowGraph};

/// Prompt length (in characters) above which prompts are truncated.
///
/// Roughly what the text encoder's 77-token window holds.
pub const MAX_PROMPT_CHARS: usize = 200;

/// A per-request copy of a template graph with parameters injected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BoundGraph(WorkflowGraph);

impl BoundGraph {
    pub fn graph(&self) -> &WorkflowGraph {
        &self.0
    }

    pub fn graph_mut(&mut self) -> &mut WorkflowGraph {
        &mut self.0
    }

    pub fn into_graph(self) -> WorkflowGraph {
        self.0
    }

    /// Serialize to the engine's workflow document.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(&self.0)
    }
}

/// Bind `params` onto a copy of `template`, using `seed` as the concrete
/// seed (callers resolve [`RANDOM_SEED`](crate::params::RANDOM_SEED) first).
pub fn bind(template: &WorkflowTemplate, params: &GenerationParams, seed: i64) -> BoundGraph {
    let prompt = truncate_prompt(&params.prompt);
    if let Cow::Owned(_) = prompt {
        tracing::warn!(
            task_id = %params.task_id,
            original_chars = params.prompt.chars().count(),
            max_chars = MAX_PROMPT_CHARS,
            "Prompt too long, truncating",
        );
    }

    let values: [(SlotRole, serde_json::Value); 8] = [
        (SlotRole::PositivePrompt, prompt.into_owned().into()),
        (SlotRole::NegativePrompt, "".into()),
        (SlotRole::Seed, seed.into()),
        (SlotRole::Steps, params.steps.into()),
        (SlotRole::Guidance, params.guidance_scale.into()),
        (SlotRole::Width, params.width.into()),
        (SlotRole::Height, params.height.into()),
        (SlotRole::OutputPrefix, output_prefix(&params.task_id).into()),
    ];

    let mut graph = template.graph().clone();
    let roles = template.roles();
    for (role, value) in values {
        let address = roles.address(role);
        // Role tables are only built for graphs that carry every slot.
        if let Some(node) = graph.node_mut(address.node_id) {
            node.inputs
                .insert(address.input.to_string(), InputValue::Literal(value));
        }
    }

    tracing::debug!(
        task_id = %params.task_id,
        template = template.name(),
        nodes = graph.len(),
        "Workflow bound",
    );

    BoundGraph(graph)
}

/// Cut `prompt` to at most [`MAX_PROMPT_CHARS`] characters.
///
/// Borrowed when no cut was needed.
pub fn truncate_prompt(prompt: &str) -> Cow<'_, str> {
    match prompt.char_indices().nth(MAX_PROMPT_CHARS) {
        Some((byte_index, _)) => Cow::Owned(prompt[..byte_index].to_string()),
        None => Cow::Borrowed(prompt),
    }
}

/// Save-node filename prefix for a task.
pub fn output_prefix(task_id: &TaskId) -> String {
    format!("{DEFAULT_OUTPUT_PREFIX}_{task_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::TaskId;
    use serde_json::json;

    fn template() -> WorkflowTemplate {
        WorkflowTemplate::flux_default().unwrap()
    }

    fn params(prompt: &str) -> GenerationParams {
        GenerationParams::new(prompt, TaskId::parse("task-1").unwrap())
            .with_size(512, 768)
            .with_steps(4)
            .with_guidance_scale(2.5)
    }

    fn literal<'a>(
        bound: &'a BoundGraph,
        template: &WorkflowTemplate,
        role: SlotRole,
    ) -> &'a serde_json::Value {
        let address = template.roles().address(role);
        bound.graph().literal(address.node_id, address.input).unwrap()
    }

    #[test]
    fn writes_every_role() {
        let template = template();
        let bound = bind(&template, &params("a cute cat"), 1234);

        assert_eq!(
            literal(&bound, &template, SlotRole::PositivePrompt),
            &json!("a cute cat")
        );
        assert_eq!(
            literal(&bound, &template, SlotRole::NegativePrompt),
            &json!("")
        );
        assert_eq!(literal(&bound, &template, SlotRole::Seed), &json!(1234));
        assert_eq!(literal(&bound, &template, SlotRole::Steps), &json!(4));
        assert_eq!(literal(&bound, &template, SlotRole::Guidance), &json!(2.5));
        assert_eq!(literal(&bound, &template, SlotRole::Width), &json!(512));
        assert_eq!(literal(&bound, &template, SlotRole::Height), &json!(768));
        assert_eq!(
            literal(&bound, &template, SlotRole::OutputPrefix),
            &json!("flux_output_task-1")
        );
    }

    #[test]
    fn leaves_unrelated_inputs_alone() {
        let template = template();
        let bound = bind(&template, &params("x"), 1);
        assert_eq!(bound.graph().node("12"), template.graph().node("12"));
        assert_eq!(
            bound.graph().node("3").unwrap().input("model"),
            template.graph().node("3").unwrap().input("model")
        );
    }

    #[test]
    fn bound_graphs_do_not_alias() {
        let template = template();
        let pristine = template.graph().clone();

        let mut first = bind(&template, &params("first"), 1);
        let second = bind(&template, &params("second"), 2);
        let second_before = second.clone();

        first
            .graph_mut()
            .node_mut("1")
            .unwrap()
            .inputs
            .insert("text".into(), InputValue::literal("mutated"));

        assert_eq!(second, second_before);
        assert_eq!(template.graph(), &pristine);
        assert_eq!(
            literal(&second, &template, SlotRole::PositivePrompt),
            &json!("second")
        );
    }

    #[test]
    fn long_prompt_is_truncated_to_threshold() {
        let long = "a".repeat(MAX_PROMPT_CHARS + 50);
        let truncated = truncate_prompt(&long);
        assert_eq!(truncated.chars().count(), MAX_PROMPT_CHARS);

        let template = template();
        let bound = bind(&template, &params(&long), 1);
        let text = literal(&bound, &template, SlotRole::PositivePrompt)
            .as_str()
            .unwrap();
        assert_eq!(text.len(), MAX_PROMPT_CHARS);
    }

    #[test]
    fn prompt_at_threshold_is_unchanged() {
        let exact = "b".repeat(MAX_PROMPT_CHARS);
        assert!(matches!(truncate_prompt(&exact), Cow::Borrowed(s) if s == exact));
        assert!(matches!(truncate_prompt("short"), Cow::Borrowed("short")));
    }

    #[test]
    fn truncation_respects_character_boundaries() {
        let wide = "猫".repeat(MAX_PROMPT_CHARS + 1);
        let truncated = truncate_prompt(&wide);
        assert_eq!(truncated.chars().count(), MAX_PROMPT_CHARS);
        assert!(truncated.chars().all(|c| c == '猫'));
    }

    #[test]
    fn engine_document_matches_bound_graph() {
        let template = template();
        let bound = bind(&template, &params("a cute cat"), 99);

        let document = bound.to_json().unwrap();
        assert_eq!(document, serde_json::to_value(bound.graph()).unwrap());
        assert_eq!(document["3"]["inputs"]["seed"], json!(99));
        assert_eq!(document["3"]["inputs"]["positive"], json!(["1", 0]));
    }

    #[test]
    fn distinct_tasks_get_distinct_prefixes() {
        let a = output_prefix(&TaskId::parse("a").unwrap());
        let b = output_prefix(&TaskId::parse("b").unwrap());
        assert_ne!(a, b);
    }
}
