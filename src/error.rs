// SPDX-License-Identifier: MIT

//! Typed error handling for vectorpipe
//!
//! Top-level error enum for the pipeline layer and the binary. The workflow
//! engine has its own layered errors ([`crate::workflow::step::StepError`],
//! [`crate::workflow::graph::GraphError`], [`crate::workflow::runner::RunError`])
//! which convert into this one at the pipeline boundary.

use std::path::PathBuf;
use thiserror::Error;

use crate::workflow::graph::GraphError;
use crate::workflow::runner::RunError;

/// Top-level error type for vectorpipe
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration errors (missing env vars, invalid config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed workflow graph definition
    #[error("Graph definition error: {0}")]
    Graph(#[from] GraphError),

    /// A workflow run aborted
    #[error("Workflow error: {0}")]
    Workflow(#[from] RunError),

    /// Read/write failure against a state or checkpoint file. Fatal when it
    /// happens on a checkpoint write: accumulated work must not be dropped.
    #[error("Persistence error at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// CSV read/write errors
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a persistence error tagged with the offending path
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Create from a generic message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<crate::llm::ModelError> for PipelineError {
    fn from(err: crate::llm::ModelError) -> Self {
        Self::Other(err.to_string())
    }
}
