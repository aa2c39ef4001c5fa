// SPDX-License-Identifier: MIT

//! Typed configuration for all pipeline stages
//!
//! One YAML file describes every stage: monitored paths, artifact locations,
//! chunker settings, index settings, model settings and the prompt templates
//! for the six agents. The config is loaded once in `main` and passed by
//! reference into constructors; nothing reads process-wide mutable state.
//! API keys come only from the environment.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::PipelineError;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub structure: StructureConfig,
    pub summaries: SummariesConfig,
    pub schema: SchemaConfig,
    pub ingest: IngestConfig,
    pub validate: ValidateConfig,
    pub upload: UploadConfig,
    pub model: ModelConfig,
    pub prompts: Prompts,
}

impl AppConfig {
    /// Load the configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path).map_err(|e| PipelineError::persistence(path, e))?;
        let config = Self::parse_yaml(&content)?;
        log::info!("config loaded from: {}", path.display());
        Ok(config)
    }

    /// Parse the configuration from a YAML string
    pub fn parse_yaml(content: &str) -> Result<Self, PipelineError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }
}

/// File-change monitoring stage
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// JSON array of file paths to monitor
    pub monitor_files: PathBuf,
    /// Persisted filename -> MD5 mapping
    pub state_file: PathBuf,
    /// Where the added/deleted/changed classification is written
    pub updated_files: PathBuf,
}

/// Source-tree introspection stage
#[derive(Debug, Clone, Deserialize)]
pub struct StructureConfig {
    /// Root of the source tree to introspect
    pub code_dir: PathBuf,
    pub gitignore_path: PathBuf,
    /// Extra names to ignore on top of .gitignore
    #[serde(default)]
    pub files_to_ignore: Vec<String>,
    /// Artifact: the combined ignore set
    pub ignored_files_artifact: PathBuf,
    /// Artifact: raw directory structure JSON
    pub directory_structure_file: PathBuf,
    /// Artifact: LLM-formatted structure text
    pub structure_file: PathBuf,
}

/// Summary workflow batch settings
#[derive(Debug, Clone, Deserialize)]
pub struct SummariesConfig {
    /// Accumulated filename -> summary mapping, rewritten after every batch
    pub checkpoint_file: PathBuf,
    /// Artifact: the checkpoint with empty-valued summary fields removed
    pub cleaned_file: PathBuf,
    #[serde(default = "default_summary_batch_size")]
    pub batch_size: usize,
}

fn default_summary_batch_size() -> usize {
    5
}

/// Graph-schema workflow settings
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    /// Input: formatted directory schema JSON
    pub structure_file: PathBuf,
    /// Artifact: final entity/relationship schema JSON
    pub schema_file: PathBuf,
    /// Artifact: Graphviz DOT rendering of the schema
    pub dot_file: PathBuf,
    #[serde(default)]
    pub human_review: bool,
}

/// Text ingestion stage
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Directory of scraped-page JSON files
    pub source_dir: PathBuf,
    /// Artifact: chunk records CSV handed to the upload stage
    pub chunk_csv: PathBuf,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

fn default_separator() -> String {
    "\n".to_string()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

/// Chunk CSV validation stage
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateConfig {
    pub read_data_dir: PathBuf,
    pub status_file: PathBuf,
    /// Metadata columns declared by the schema; `id` and `values` are implied
    pub columns: Vec<String>,
}

/// Vector upload stage
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub read_data_dir: PathBuf,
    pub status_file: PathBuf,
    pub index: IndexConfig,
    #[serde(default = "default_upload_batch_size")]
    pub batch_size: usize,
    /// Delete and recreate the index before uploading
    #[serde(default)]
    pub delete_index: bool,
}

fn default_upload_batch_size() -> usize {
    100
}

/// Vector index settings
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    pub name: String,
    pub dimension: usize,
    pub metric: String,
    pub environment: String,
}

/// Language-model settings shared by all agents
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub model_name: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// Prompt templates for every agent in the two workflows plus the
/// structure formatter. Placeholders use `{name}` syntax.
#[derive(Debug, Clone, Deserialize)]
pub struct Prompts {
    pub summary_generator: String,
    pub summary_classifier: String,
    pub summary_feedback: String,
    pub summary_editor: String,
    pub schema_generator: String,
    pub schema_reviewer: String,
    pub schema_editor: String,
    pub structure_formatter: String,
}
