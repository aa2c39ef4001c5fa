// SPDX-License-Identifier: MIT

//! Step and router traits plus the step-level error type
//!
//! A step is a pure function of the fields it reads from state to a partial
//! update; a router reads state and returns a decision key for a conditional
//! edge. Step failures are always surfaced as `Err` values: the runner (or the
//! batch driver above it) owns the recovery policy, never the step itself.

use async_trait::async_trait;
use thiserror::Error;

use super::state::{StateUpdate, WorkflowState};
use crate::llm::ModelError;

/// Errors produced while executing a single step
#[derive(Debug, Error)]
pub enum StepError {
    /// Network/backend failure calling the language model
    #[error("model invocation failed: {0}")]
    Model(String),

    /// The backend returned text that does not parse as the expected type.
    /// Distinct from [`StepError::Model`]: the transport succeeded.
    #[error("failed to parse model output as {expected}: {message}")]
    Parse {
        expected: &'static str,
        message: String,
    },

    /// A state field the step depends on is absent
    #[error("required state field '{field}' is missing")]
    MissingInput { field: String },

    /// Reviewer interaction failed (console read error)
    #[error("reviewer failed: {0}")]
    Review(String),
}

impl From<ModelError> for StepError {
    fn from(err: ModelError) -> Self {
        StepError::Model(err.to_string())
    }
}

/// A named workflow step: `(state) -> partial state update`
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, StepError>;
}

/// A router for conditional edges: `(state) -> decision key`.
/// The key is looked up in the edge's branch table by the runner; a key with
/// no branch is a routing error there, never a silent default.
#[async_trait]
pub trait Router: Send + Sync {
    async fn route(&self, state: &WorkflowState) -> Result<String, StepError>;
}

/// Adapter turning a plain synchronous function into a [`Step`]
pub struct FnStep<F>(pub F);

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&WorkflowState) -> Result<StateUpdate, StepError> + Send + Sync,
{
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, StepError> {
        (self.0)(state)
    }
}

/// Adapter turning a plain synchronous function into a [`Router`]
pub struct FnRouter<F>(pub F);

#[async_trait]
impl<F> Router for FnRouter<F>
where
    F: Fn(&WorkflowState) -> Result<String, StepError> + Send + Sync,
{
    async fn route(&self, state: &WorkflowState) -> Result<String, StepError> {
        (self.0)(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_step_runs_closure() {
        let step = FnStep(|state: &WorkflowState| {
            let value = state.require("input")?.clone();
            Ok(StateUpdate::counted().set("output", value))
        });

        let mut state = WorkflowState::new();
        state.set("input", json!("hello"));

        let update = step.run(&state).await.unwrap();
        assert!(update.counts_step());
    }

    #[tokio::test]
    async fn test_fn_step_propagates_missing_input() {
        let step = FnStep(|state: &WorkflowState| {
            state.require("absent")?;
            Ok(StateUpdate::silent())
        });

        let err = step.run(&WorkflowState::new()).await.unwrap_err();
        assert!(matches!(err, StepError::MissingInput { .. }));
    }

    #[tokio::test]
    async fn test_fn_router_returns_decision() {
        let router = FnRouter(|state: &WorkflowState| {
            Ok(if state.get("flag").is_some() {
                "yes".to_string()
            } else {
                "no".to_string()
            })
        });

        assert_eq!(router.route(&WorkflowState::new()).await.unwrap(), "no");
    }

    #[test]
    fn test_model_error_maps_to_model_variant() {
        let err: StepError = ModelError::Backend("boom".to_string()).into();
        assert!(matches!(err, StepError::Model(_)));
    }
}
