// SPDX-License-Identifier: MIT

//! Runtime state threaded through workflow execution
//!
//! A [`WorkflowState`] is created fresh per workflow invocation and discarded
//! after the terminal step reads out the final artifact. Steps never mutate it
//! directly: each returns a [`StateUpdate`] holding only the fields it owns,
//! and the runner merges that update in. `num_steps` advances by exactly one
//! per counted step, so it is monotonically non-decreasing over a run.

use std::collections::HashMap;

use serde_json::Value;

use super::step::StepError;

/// Workflow state: a JSON-valued field map plus the step counter.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    fields: HashMap<String, Value>,
    num_steps: u32,
}

impl WorkflowState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a field before the run starts
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a field a step depends on, failing with the field name if absent
    pub fn require(&self, key: &str) -> Result<&Value, StepError> {
        self.fields.get(key).ok_or_else(|| StepError::MissingInput {
            field: key.to_string(),
        })
    }

    /// Number of counted steps executed so far
    pub fn num_steps(&self) -> u32 {
        self.num_steps
    }

    /// Merge a step's partial update. Only the fields the step wrote are
    /// touched; the counter bumps iff the update counts as a step.
    pub fn apply(&mut self, update: StateUpdate) {
        for (key, value) in update.fields {
            self.fields.insert(key, value);
        }
        if update.counts_step {
            self.num_steps += 1;
        }
    }

    /// Snapshot the state (fields plus `num_steps`) as a JSON object
    pub fn to_json(&self) -> Value {
        let mut map: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        map.insert("num_steps".to_string(), Value::from(self.num_steps));
        Value::Object(map)
    }
}

/// The partial update a step returns: fields to merge plus whether the step
/// counts against `num_steps`. Terminal/diagnostic steps are silent.
#[derive(Debug, Default)]
pub struct StateUpdate {
    fields: Vec<(String, Value)>,
    counts_step: bool,
}

impl StateUpdate {
    /// An update from a counted step; merging it bumps `num_steps` by one
    pub fn counted() -> Self {
        Self {
            fields: Vec::new(),
            counts_step: true,
        }
    }

    /// An update that leaves the step counter alone
    pub fn silent() -> Self {
        Self::default()
    }

    /// Add a field this step owns
    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    pub fn counts_step(&self) -> bool {
        self.counts_step
    }
}
