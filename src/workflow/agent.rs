// SPDX-License-Identifier: MIT

//! Agent steps: prompt template + model call + output parse
//!
//! An [`AgentStep`] pulls its named inputs from state, fills a prompt
//! template, invokes the model backend and parses the result as text or JSON,
//! returning a partial update for the single field it owns. An
//! [`AgentRouter`] does the same but returns the model's normalized answer as
//! a routing decision key instead of a state update.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::state::{StateUpdate, WorkflowState};
use super::step::{Router, Step, StepError};
use crate::llm::{GenerationConfig, Model};

/// Prompt template with named `{var}` placeholders
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    variables: Vec<String>,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>, variables: &[&str]) -> Self {
        Self {
            template: template.into(),
            variables: variables.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Fill every declared variable. A declared variable without a value is
    /// an error; an unknown placeholder in the template is left untouched.
    pub fn fill(&self, values: &HashMap<&str, String>) -> Result<String, StepError> {
        let mut prompt = self.template.clone();
        for var in &self.variables {
            let value = values
                .get(var.as_str())
                .ok_or_else(|| StepError::MissingInput { field: var.clone() })?;
            prompt = prompt.replace(&format!("{{{var}}}"), value);
        }
        Ok(prompt)
    }
}

/// How an agent step interprets the model output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Render a state value for prompt interpolation: strings go in verbatim,
/// everything else is serialized.
pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Strip a surrounding Markdown code fence, if present
fn strip_code_fence(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parse model output as JSON, tolerating code fences. Empty output and
/// unparseable output are both parse failures, distinct from transport
/// errors raised by the model backend itself.
pub(crate) fn parse_json_output(output: &str) -> Result<Value, StepError> {
    let cleaned = strip_code_fence(output);
    if cleaned.is_empty() {
        return Err(StepError::Parse {
            expected: "json",
            message: "empty model output".to_string(),
        });
    }
    serde_json::from_str(cleaned).map_err(|e| StepError::Parse {
        expected: "json",
        message: e.to_string(),
    })
}

fn parse_text_output(output: &str) -> Result<Value, StepError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(StepError::Parse {
            expected: "text",
            message: "empty model output".to_string(),
        });
    }
    Ok(Value::String(trimmed.to_string()))
}

/// One prompt-template-bound call to the language model, writing one field
pub struct AgentStep {
    name: String,
    template: PromptTemplate,
    model: Arc<dyn Model>,
    generation: GenerationConfig,
    /// template variable -> state field supplying it
    inputs: Vec<(String, String)>,
    output_field: String,
    format: OutputFormat,
}

impl AgentStep {
    pub fn new(name: impl Into<String>, template: PromptTemplate, model: Arc<dyn Model>) -> Self {
        Self {
            name: name.into(),
            template,
            model,
            generation: GenerationConfig::default(),
            inputs: Vec::new(),
            output_field: String::new(),
            format: OutputFormat::Text,
        }
    }

    pub fn generation(mut self, config: GenerationConfig) -> Self {
        self.generation = config;
        self
    }

    /// Bind a template variable to the state field that supplies it
    pub fn input(mut self, variable: impl Into<String>, field: impl Into<String>) -> Self {
        self.inputs.push((variable.into(), field.into()));
        self
    }

    /// Declare the single state field this step owns
    pub fn output(mut self, field: impl Into<String>, format: OutputFormat) -> Self {
        self.output_field = field.into();
        self.format = format;
        self
    }

    async fn invoke(&self, state: &WorkflowState) -> Result<String, StepError> {
        let mut values = HashMap::new();
        for (variable, field) in &self.inputs {
            let value = state.require(field)?;
            values.insert(variable.as_str(), render_value(value));
        }
        let prompt = self.template.fill(&values)?;
        Ok(self.model.generate(&prompt, Some(&self.generation)).await?)
    }
}

#[async_trait]
impl Step for AgentStep {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, StepError> {
        log::info!("Agent step {} invoking model", self.name);
        let output = self.invoke(state).await?;
        let parsed = match self.format {
            OutputFormat::Text => parse_text_output(&output)?,
            OutputFormat::Json => parse_json_output(&output)?,
        };
        Ok(StateUpdate::counted().set(&self.output_field, parsed))
    }
}

/// A classifier agent used on conditional edges. Its normalized answer
/// (trimmed, lowercased, quotes stripped) is the routing decision key; the
/// branch table decides whether that answer is in vocabulary.
pub struct AgentRouter {
    name: String,
    template: PromptTemplate,
    model: Arc<dyn Model>,
    generation: GenerationConfig,
    inputs: Vec<(String, String)>,
}

impl AgentRouter {
    pub fn new(name: impl Into<String>, template: PromptTemplate, model: Arc<dyn Model>) -> Self {
        Self {
            name: name.into(),
            template,
            model,
            generation: GenerationConfig::default(),
            inputs: Vec::new(),
        }
    }

    pub fn generation(mut self, config: GenerationConfig) -> Self {
        self.generation = config;
        self
    }

    pub fn input(mut self, variable: impl Into<String>, field: impl Into<String>) -> Self {
        self.inputs.push((variable.into(), field.into()));
        self
    }

    fn normalize(answer: &str) -> String {
        answer
            .trim()
            .trim_matches(|c| c == '"' || c == '\'' || c == '`')
            .trim()
            .to_lowercase()
    }
}

#[async_trait]
impl Router for AgentRouter {
    async fn route(&self, state: &WorkflowState) -> Result<String, StepError> {
        log::info!("Router {} invoking classifier", self.name);
        let mut values = HashMap::new();
        for (variable, field) in &self.inputs {
            let value = state.require(field)?;
            values.insert(variable.as_str(), render_value(value));
        }
        let prompt = self.template.fill(&values)?;
        let answer = self.model.generate(&prompt, Some(&self.generation)).await?;
        let decision = Self::normalize(&answer);
        if decision.is_empty() {
            return Err(StepError::Parse {
                expected: "text",
                message: "empty classifier answer".to_string(),
            });
        }
        Ok(decision)
    }
}
