// SPDX-License-Identifier: MIT

//! Sequential workflow runner
//!
//! Executes a compiled graph from its entry step until the end sentinel.
//! One step runs to completion before the next starts; there is no parallel
//! execution. A step failure or an unmapped routing decision aborts the run
//! for this record; the caller decides whether to retry, skip or stop.

use std::time::Instant;

use thiserror::Error;

use super::graph::{CompiledGraph, Edge, Target};
use super::state::WorkflowState;
use super::step::StepError;

/// Errors that abort a single workflow run
#[derive(Debug, Error)]
pub enum RunError {
    /// A step returned a failure; downstream state was not touched
    #[error("step '{step}' failed: {source}")]
    Step {
        step: String,
        #[source]
        source: StepError,
    },

    /// The router produced a decision with no branch mapped for it.
    /// There is no safe default branch to pick, so the run stops here.
    #[error("router after step '{step}' returned unmapped decision '{decision}'")]
    Routing { step: String, decision: String },

    /// The run exceeded the step budget, which in a well-formed acyclic
    /// graph means the definition contains a cycle
    #[error("workflow exceeded {limit} steps without reaching the end marker")]
    StepLimit { limit: u32 },
}

/// Drives a compiled graph over a state
pub struct Runner {
    max_steps: u32,
}

impl Runner {
    pub fn new() -> Self {
        Self { max_steps: 100 }
    }

    pub fn with_max_steps(max_steps: u32) -> Self {
        Self { max_steps }
    }

    /// Run the graph to the end marker, returning the final state
    pub async fn run(
        &self,
        graph: &CompiledGraph,
        mut state: WorkflowState,
    ) -> Result<WorkflowState, RunError> {
        let mut current = graph.entry().to_string();
        let mut executed = 0u32;

        loop {
            executed += 1;
            if executed > self.max_steps {
                return Err(RunError::StepLimit {
                    limit: self.max_steps,
                });
            }

            // compile() guarantees every reachable name is a defined step
            let step = &graph.steps[&current];
            log::info!("Executing step: {}", current);
            let started = Instant::now();

            let update = step.run(&state).await.map_err(|source| RunError::Step {
                step: current.clone(),
                source,
            })?;
            state.apply(update);
            log::info!("Step {} finished in {:?}", current, started.elapsed());

            let next = match &graph.edges[&current] {
                Edge::Direct(target) => target.clone(),
                Edge::Conditional { router, branches } => {
                    let decision =
                        router
                            .route(&state)
                            .await
                            .map_err(|source| RunError::Step {
                                step: current.clone(),
                                source,
                            })?;
                    log::info!("Router after {} decided: {}", current, decision);
                    match branches.get(&decision) {
                        Some(target) => target.clone(),
                        None => {
                            return Err(RunError::Routing {
                                step: current,
                                decision,
                            })
                        }
                    }
                }
            };

            match next {
                Target::End => return Ok(state),
                Target::Step(name) => current = name,
            }
        }
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::graph::GraphBuilder;
    use crate::workflow::state::StateUpdate;
    use crate::workflow::step::{FnRouter, FnStep, Step};
    use serde_json::json;
    use std::sync::Arc;

    fn recording_step(name: &'static str) -> Arc<dyn Step> {
        Arc::new(FnStep(move |state: &WorkflowState| {
            let mut order: Vec<String> = state
                .get("order")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            order.push(name.to_string());
            Ok(StateUpdate::counted().set("order", json!(order)))
        }))
    }

    #[tokio::test]
    async fn test_entry_runs_first_and_run_terminates() {
        let mut builder = GraphBuilder::new();
        builder.add_step("first", recording_step("first"));
        builder.add_step("second", recording_step("second"));
        builder.set_entry("first");
        builder.add_edge("first", Target::step("second"));
        builder.add_edge("second", Target::End);
        let graph = builder.compile().unwrap();

        let state = Runner::new()
            .run(&graph, WorkflowState::new())
            .await
            .unwrap();

        assert_eq!(state.get("order"), Some(&json!(["first", "second"])));
        assert_eq!(state.num_steps(), 2);
    }

    #[tokio::test]
    async fn test_conditional_edge_follows_decision() {
        let mut builder = GraphBuilder::new();
        builder.add_step("classify", recording_step("classify"));
        builder.add_step("left", recording_step("left"));
        builder.add_step("right", recording_step("right"));
        builder.set_entry("classify");
        builder.add_conditional_edges(
            "classify",
            Arc::new(FnRouter(|_: &WorkflowState| Ok("left".to_string()))),
            vec![
                ("left", Target::step("left")),
                ("right", Target::step("right")),
            ],
        );
        builder.add_edge("left", Target::End);
        builder.add_edge("right", Target::End);
        let graph = builder.compile().unwrap();

        let state = Runner::new()
            .run(&graph, WorkflowState::new())
            .await
            .unwrap();

        assert_eq!(state.get("order"), Some(&json!(["classify", "left"])));
    }

    #[tokio::test]
    async fn test_unmapped_decision_is_routing_error() {
        let mut builder = GraphBuilder::new();
        builder.add_step("classify", recording_step("classify"));
        builder.add_step("left", recording_step("left"));
        builder.set_entry("classify");
        builder.add_conditional_edges(
            "classify",
            Arc::new(FnRouter(|_: &WorkflowState| Ok("sideways".to_string()))),
            vec![("left", Target::step("left"))],
        );
        builder.add_edge("left", Target::End);
        let graph = builder.compile().unwrap();

        let err = Runner::new()
            .run(&graph, WorkflowState::new())
            .await
            .unwrap_err();

        assert!(
            matches!(err, RunError::Routing { ref step, ref decision }
                if step == "classify" && decision == "sideways")
        );
    }

    #[tokio::test]
    async fn test_step_failure_aborts_run() {
        let failing: Arc<dyn Step> = Arc::new(FnStep(|_: &WorkflowState| {
            Err(StepError::Model("backend down".to_string()))
        }));

        let mut builder = GraphBuilder::new();
        builder.add_step("boom", failing);
        builder.set_entry("boom");
        builder.add_edge("boom", Target::End);
        let graph = builder.compile().unwrap();

        let err = Runner::new()
            .run(&graph, WorkflowState::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Step { ref step, .. } if step == "boom"));
    }

    #[tokio::test]
    async fn test_cyclic_graph_hits_step_limit() {
        let mut builder = GraphBuilder::new();
        builder.add_step("a", recording_step("a"));
        builder.add_step("b", recording_step("b"));
        builder.set_entry("a");
        builder.add_edge("a", Target::step("b"));
        builder.add_edge("b", Target::step("a"));
        let graph = builder.compile().unwrap();

        let err = Runner::with_max_steps(10)
            .run(&graph, WorkflowState::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::StepLimit { limit: 10 }));
    }
}
