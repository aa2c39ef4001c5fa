// SPDX-License-Identifier: MIT

//! Workflow graph definition and compilation
//!
//! A graph is an ordered collection of named steps plus an edge relation:
//! straight edges and conditional edges (a router whose decision key selects
//! the next step from a branch table). Exactly one entry step; the end marker
//! is a sentinel [`Target::End`], not a step. `compile()` validates the whole
//! definition up front and refuses to produce a runnable graph from a
//! malformed one.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::step::{Router, Step};

/// Where an edge leads: a named step, or the end sentinel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Step(String),
    End,
}

impl Target {
    /// Convenience constructor for a step target
    pub fn step(name: impl Into<String>) -> Self {
        Target::Step(name.into())
    }
}

/// Outgoing edge of a step
pub(crate) enum Edge {
    Direct(Target),
    Conditional {
        router: Arc<dyn Router>,
        branches: HashMap<String, Target>,
    },
}

/// Malformed graph definition. Fatal at construction time: a graph that
/// fails to compile never runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("graph has no entry point")]
    MissingEntry,

    #[error("entry step '{0}' is not defined")]
    UnknownEntry(String),

    #[error("step '{0}' is defined twice")]
    DuplicateStep(String),

    #[error("edge starts at undefined step '{0}'")]
    EdgeFromUnknownStep(String),

    #[error("step '{0}' has more than one outgoing edge")]
    DuplicateEdge(String),

    #[error("edge from '{from}' targets undefined step '{to}'")]
    DanglingTarget { from: String, to: String },

    #[error("step '{0}' has no outgoing edge")]
    MissingEdge(String),
}

/// Builder for workflow graphs
#[derive(Default)]
pub struct GraphBuilder {
    steps: Vec<(String, Arc<dyn Step>)>,
    edges: Vec<(String, Edge)>,
    entry: Option<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named step
    pub fn add_step(&mut self, name: impl Into<String>, step: Arc<dyn Step>) {
        self.steps.push((name.into(), step));
    }

    /// Declare the entry step
    pub fn set_entry(&mut self, name: impl Into<String>) {
        self.entry = Some(name.into());
    }

    /// Add a straight edge from `from` to `target`
    pub fn add_edge(&mut self, from: impl Into<String>, target: Target) {
        self.edges.push((from.into(), Edge::Direct(target)));
    }

    /// Add a conditional edge: after `from`, the router's decision key picks
    /// the target from `branches`
    pub fn add_conditional_edges(
        &mut self,
        from: impl Into<String>,
        router: Arc<dyn Router>,
        branches: Vec<(&str, Target)>,
    ) {
        let branches = branches
            .into_iter()
            .map(|(key, target)| (key.to_string(), target))
            .collect();
        self.edges
            .push((from.into(), Edge::Conditional { router, branches }));
    }

    /// Validate and compile the graph
    pub fn compile(self) -> Result<CompiledGraph, GraphError> {
        let mut steps: HashMap<String, Arc<dyn Step>> = HashMap::new();
        for (name, step) in self.steps {
            if steps.insert(name.clone(), step).is_some() {
                return Err(GraphError::DuplicateStep(name));
            }
        }

        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !steps.contains_key(&entry) {
            return Err(GraphError::UnknownEntry(entry));
        }

        let mut edges: HashMap<String, Edge> = HashMap::new();
        for (from, edge) in self.edges {
            if !steps.contains_key(&from) {
                return Err(GraphError::EdgeFromUnknownStep(from));
            }
            let targets: Vec<&Target> = match &edge {
                Edge::Direct(t) => vec![t],
                Edge::Conditional { branches, .. } => branches.values().collect(),
            };
            for target in targets {
                if let Target::Step(to) = target {
                    if !steps.contains_key(to) {
                        return Err(GraphError::DanglingTarget {
                            from,
                            to: to.clone(),
                        });
                    }
                }
            }
            if edges.insert(from.clone(), edge).is_some() {
                return Err(GraphError::DuplicateEdge(from));
            }
        }

        for name in steps.keys() {
            if !edges.contains_key(name) {
                return Err(GraphError::MissingEdge(name.clone()));
            }
        }

        Ok(CompiledGraph {
            steps,
            edges,
            entry,
        })
    }
}

/// A validated graph ready for execution. Every edge target is a defined
/// step, the entry exists, and every step has exactly one outgoing edge.
pub struct CompiledGraph {
    pub(crate) steps: HashMap<String, Arc<dyn Step>>,
    pub(crate) edges: HashMap<String, Edge>,
    pub(crate) entry: String,
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .field("edges", &self.edges.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .finish()
    }
}

impl CompiledGraph {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
