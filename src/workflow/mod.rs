// SPDX-License-Identifier: MIT

//! Multi-step agent workflow engine
//!
//! The engine is a small directed-graph executor: named steps, straight and
//! conditional edges, one entry, an end sentinel. Definition is validated at
//! compile time, execution is strictly sequential, and all step failures are
//! surfaced as errors to the caller.

pub mod agent;
pub mod graph;
pub mod review;
pub mod runner;
pub mod state;
pub mod step;

pub use agent::{AgentRouter, AgentStep, OutputFormat, PromptTemplate};
pub use graph::{CompiledGraph, GraphBuilder, GraphError, Target};
pub use review::{ConsoleReviewer, ReviewDecision, Reviewer, ScriptedReviewer};
pub use runner::{RunError, Runner};
pub use state::{StateUpdate, WorkflowState};
pub use step::{FnRouter, FnStep, Router, Step, StepError};
