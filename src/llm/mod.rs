// SPDX-License-Identifier: MIT

//! Language-model backends
//!
//! This module provides the core [`Model`] trait plus the concrete backends:
//! - [groq] - Groq's OpenAI-compatible chat completions API
//! - [embeddings] - embeddings backend used by the ingestion stage

pub mod embeddings;
pub mod groq;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Model/LLM-specific errors. Transport and backend failures only; parse
/// failures of model *output* are a separate concern owned by the caller.
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured: {0} must be set")]
    ApiKeyMissing(String),

    /// Backend returned a non-success status or a malformed envelope
    #[error("Model backend error: {0}")]
    Backend(String),

    /// HTTP request errors (includes request timeouts)
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// Core trait for LLM model implementations.
///
/// The contract the workflow engine depends on: a call either returns *some*
/// string or fails with a [`ModelError`]. Whether that string parses as the
/// expected structured type is decided by the calling step.
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        config: Option<&GenerationConfig>,
    ) -> Result<String, ModelError>;
}
