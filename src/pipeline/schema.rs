// SPDX-License-Identifier: MIT

//! Graph-schema workflow: propose an entity/relationship model for the tree
//!
//! A generator agent drafts an entity/relationship schema from the formatted
//! directory structure, a reviewer agent critiques it, and an optional human
//! checkpoint decides what to do with that critique. The sentinel feedback
//! "no changes" routes past the editor; anything else sends the draft and
//! the feedback through the editor agent. The final schema is saved as JSON,
//! and both the draft and the final schema are rendered to Graphviz DOT.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{Prompts, SchemaConfig};
use crate::error::PipelineError;
use crate::llm::{GenerationConfig, Model};
use crate::util::{load_json, save_json};
use crate::workflow::agent::render_value;
use crate::workflow::{
    AgentStep, CompiledGraph, FnRouter, FnStep, GraphBuilder, OutputFormat, PromptTemplate,
    ReviewDecision, Reviewer, Runner, StateUpdate, Step, StepError, Target, WorkflowState,
};

use async_trait::async_trait;

/// Feedback value that means the draft needs no editing
const NO_CHANGES: &str = "no changes";

/// An entity attribute with its schema.org vocabulary term
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub schema_org_term: String,
}

/// A node in the proposed graph model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub schema_org_term: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

/// A directed edge between two entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "from")]
    pub from_entity: String,
    pub to: String,
    pub name: String,
    pub schema_org_term: String,
}

/// The entity/relationship model the workflow produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphModel {
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

fn short_term(term: &str) -> &str {
    term.strip_prefix("https://schema.org/").unwrap_or(term)
}

fn node_id(name: &str) -> String {
    format!("{}_node", name.replace(' ', "_"))
}

fn escape_label(label: &str) -> String {
    label.replace('"', "\\\"").replace('\n', "\\n")
}

/// Render the model as Graphviz DOT source using record-shaped nodes.
/// Pure; writing and rasterizing the output is the caller's concern.
pub fn render_dot(model: &GraphModel) -> String {
    let mut dot = String::from("digraph {\n    layout=neato\n    node [shape=Mrecord]\n");

    for entity in &model.entities {
        let mut label = format!(
            "{{ Entity: {}\n(sch:{}) ",
            entity.name,
            short_term(&entity.schema_org_term)
        );
        for attr in &entity.attributes {
            label.push_str(&format!(
                "|{}\n(sch:{}) ",
                attr.name,
                short_term(&attr.schema_org_term)
            ));
        }
        label.push('}');
        dot.push_str(&format!(
            "    \"{}\" [label=\"{}\"]\n",
            node_id(&entity.name),
            escape_label(&label)
        ));
    }

    for rel in &model.relationships {
        let label = format!("{}\n(sch:{}) ", rel.name, short_term(&rel.schema_org_term));
        dot.push_str(&format!(
            "    \"{}\" -> \"{}\" [label=\"{}\", len=\"6.00\"]\n",
            node_id(&rel.from_entity),
            node_id(&rel.to),
            escape_label(&label)
        ));
    }

    dot.push_str("}\n");
    dot
}

/// The human checkpoint between the reviewer agent and the editor.
///
/// With no reviewer attached the step only annotates the state. With one
/// attached, the decision rewrites `agent_feedback` so the router downstream
/// sees what the human decided: accepted feedback passes through, "the draft
/// is correct" becomes the no-changes sentinel plus an early final schema,
/// and free-text feedback replaces the agent's. Never counted as a step.
struct HumanReviewStep {
    reviewer: Option<Arc<dyn Reviewer>>,
}

#[async_trait]
impl Step for HumanReviewStep {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, StepError> {
        let Some(reviewer) = &self.reviewer else {
            return Ok(StateUpdate::silent().set("human_feedback", Value::from("No human in the loop")));
        };

        let agent_feedback = render_value(state.require("agent_feedback")?);
        match reviewer.review(&agent_feedback)? {
            ReviewDecision::AcceptAgentFeedback => Ok(StateUpdate::silent()
                .set("human_feedback", Value::from("proceed with agent feedback"))),
            ReviewDecision::DraftIsCorrect => {
                let draft = state.require("draft_graph_schema")?.clone();
                Ok(StateUpdate::silent()
                    .set("agent_feedback", Value::from(NO_CHANGES))
                    .set("human_feedback", Value::from("model is correct"))
                    .set("final_schema", draft))
            }
            ReviewDecision::Feedback(text) => Ok(StateUpdate::silent()
                .set("agent_feedback", Value::from(text.clone()))
                .set("human_feedback", Value::from(text))),
        }
    }
}

/// The schema generation workflow
pub struct SchemaWorkflow {
    graph: CompiledGraph,
    runner: Runner,
}

impl SchemaWorkflow {
    pub fn new(
        prompts: &Prompts,
        model: Arc<dyn Model>,
        generation: GenerationConfig,
        reviewer: Option<Arc<dyn Reviewer>>,
    ) -> Result<Self, PipelineError> {
        let generate = AgentStep::new(
            "generate_schema",
            PromptTemplate::new(&prompts.schema_generator, &["dir_schema"]),
            Arc::clone(&model),
        )
        .generation(generation.clone())
        .input("dir_schema", "dir_schema")
        .output("draft_graph_schema", OutputFormat::Json);

        let reviewer_agent = AgentStep::new(
            "schema_reviewer",
            PromptTemplate::new(&prompts.schema_reviewer, &["current_model"]),
            Arc::clone(&model),
        )
        .generation(generation.clone())
        .input("current_model", "draft_graph_schema")
        .output("agent_feedback", OutputFormat::Text);

        let editor = AgentStep::new(
            "schema_editor",
            PromptTemplate::new(&prompts.schema_editor, &["feedback", "current_model"]),
            model,
        )
        .generation(generation)
        .input("feedback", "agent_feedback")
        .input("current_model", "draft_graph_schema")
        .output("final_schema", OutputFormat::Json);

        let route_to_edit = FnRouter(|state: &WorkflowState| {
            let feedback = render_value(state.require("agent_feedback")?);
            if feedback.trim() == NO_CHANGES {
                log::info!("schema needs no changes");
                Ok("no_edit".to_string())
            } else {
                log::info!("schema needs changes, routing to editor");
                Ok("edit".to_string())
            }
        });

        let state_printer = FnStep(|state: &WorkflowState| {
            log::info!("---STATE PRINTER---");
            if let Some(feedback) = state.get("agent_feedback") {
                log::info!("agent feedback: {feedback}");
            }
            if let Some(feedback) = state.get("human_feedback") {
                log::info!("human feedback: {feedback}");
            }
            log::info!("num_steps: {}", state.num_steps());
            Ok(StateUpdate::silent())
        });

        let mut builder = GraphBuilder::new();
        builder.add_step("generate_schema", Arc::new(generate));
        builder.add_step("schema_reviewer", Arc::new(reviewer_agent));
        builder.add_step("human_reviewer", Arc::new(HumanReviewStep { reviewer }));
        builder.add_step("schema_editor", Arc::new(editor));
        builder.add_step("state_printer", Arc::new(state_printer));

        builder.set_entry("generate_schema");
        builder.add_edge("generate_schema", Target::step("schema_reviewer"));
        builder.add_edge("schema_reviewer", Target::step("human_reviewer"));
        builder.add_conditional_edges(
            "human_reviewer",
            Arc::new(route_to_edit),
            vec![
                ("no_edit", Target::step("state_printer")),
                ("edit", Target::step("schema_editor")),
            ],
        );
        builder.add_edge("schema_editor", Target::step("state_printer"));
        builder.add_edge("state_printer", Target::End);

        let graph = builder.compile()?;
        log::info!("schema workflow graph compiled");
        Ok(Self {
            graph,
            runner: Runner::new(),
        })
    }

    /// Run the workflow over a directory schema value
    pub async fn run(&self, dir_schema: Value) -> Result<WorkflowState, PipelineError> {
        let mut state = WorkflowState::new();
        state.set("dir_schema", dir_schema);
        Ok(self.runner.run(&self.graph, state).await?)
    }

    /// Run the workflow end to end and persist the schema artifacts.
    ///
    /// Both the draft and the final schema get a DOT rendering so the two
    /// can be compared side by side. The JSON schema write is required; the
    /// DOT renderings are best-effort since a schema the model shaped
    /// loosely may not deserialize into the typed graph model.
    pub async fn run_and_save(&self, config: &SchemaConfig) -> Result<(), PipelineError> {
        let dir_schema: Value = load_json(&config.structure_file)?;
        let state = self.run(dir_schema).await?;

        if let Some(draft) = state.get("draft_graph_schema") {
            render_dot_artifact(draft, &draft_dot_path(&config.dot_file))?;
        }

        let final_schema = state
            .get("final_schema")
            .or_else(|| state.get("draft_graph_schema"))
            .ok_or_else(|| PipelineError::other("workflow finished without a schema"))?;

        save_json(&config.schema_file, final_schema)?;
        log::info!("graph schema saved at: {}", config.schema_file.display());

        render_dot_artifact(final_schema, &config.dot_file)?;
        Ok(())
    }
}

fn render_dot_artifact(schema: &Value, path: &Path) -> Result<(), PipelineError> {
    match serde_json::from_value::<GraphModel>(schema.clone()) {
        Ok(model) => {
            let dot = render_dot(&model);
            std::fs::write(path, dot).map_err(|e| PipelineError::persistence(path, e))?;
            log::info!("graph rendering saved at: {}", path.display());
        }
        Err(e) => log::warn!("schema does not fit the graph model, skipping rendering: {e}"),
    }
    Ok(())
}

/// Sibling of the final DOT file with `_draft` appended to the stem
fn draft_dot_path(dot_file: &Path) -> PathBuf {
    let mut name = dot_file
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push("_draft");
    if let Some(ext) = dot_file.extension() {
        name.push(".");
        name.push(ext);
    }
    dot_file.with_file_name(name)
}
