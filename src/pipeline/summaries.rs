// SPDX-License-Identifier: MIT

//! Summary workflow: generate a JSON summary per source file
//!
//! Three agents and a classifier wired into a graph. The generator drafts a
//! JSON summary of the file; the classifier decides whether the draft came
//! back as structured JSON ("other") or degraded to prose ("text"). Prose
//! drafts get a feedback pass and an edit pass; clean drafts are finalized
//! as-is. A batch driver runs the workflow over many files with a persisted
//! checkpoint so interrupted runs resume where they left off, and a cleaning
//! pass strips empty-valued fields from the accumulated records.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::{Prompts, SummariesConfig};
use crate::error::PipelineError;
use crate::llm::{GenerationConfig, Model};
use crate::util::{load_json, read_text_lossy, save_json};
use crate::workflow::{
    AgentRouter, AgentStep, CompiledGraph, FnStep, GraphBuilder, OutputFormat, PromptTemplate,
    Runner, StateUpdate, Target, WorkflowState,
};

/// Outcome of a batch run over many files
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<PathBuf>,
    /// File and the error that aborted its workflow run
    pub failed: Vec<(PathBuf, String)>,
    pub skipped_empty: Vec<PathBuf>,
}

/// The per-file summary workflow
pub struct SummaryWorkflow {
    graph: CompiledGraph,
    runner: Runner,
}

impl SummaryWorkflow {
    /// Build and compile the workflow graph
    pub fn new(
        prompts: &Prompts,
        model: Arc<dyn Model>,
        generation: GenerationConfig,
    ) -> Result<Self, PipelineError> {
        let generate = AgentStep::new(
            "generate_summary",
            PromptTemplate::new(&prompts.summary_generator, &["content"]),
            Arc::clone(&model),
        )
        .generation(generation.clone())
        .input("content", "initial_file")
        .output("draft_json_summary", OutputFormat::Json);

        let classifier = AgentRouter::new(
            "format_classifier",
            PromptTemplate::new(&prompts.summary_classifier, &["file"]),
            Arc::clone(&model),
        )
        .generation(generation.clone())
        .input("file", "draft_json_summary");

        let feedback = AgentStep::new(
            "feedback",
            PromptTemplate::new(&prompts.summary_feedback, &["draft_json"]),
            Arc::clone(&model),
        )
        .generation(generation.clone())
        .input("draft_json", "draft_json_summary")
        .output("json_feedback", OutputFormat::Json);

        let edit = AgentStep::new(
            "edit",
            PromptTemplate::new(&prompts.summary_editor, &["file", "feedback"]),
            Arc::clone(&model),
        )
        .generation(generation)
        .input("file", "draft_json_summary")
        .input("feedback", "json_feedback")
        .output("final_json_summary", OutputFormat::Json);

        // Correct drafts are promoted to final without another model call
        let no_rewrite = FnStep(|state: &WorkflowState| {
            let draft = state.require("draft_json_summary")?.clone();
            log::info!("draft summary accepted as final");
            Ok(StateUpdate::counted().set("final_json_summary", draft))
        });

        let state_printer = FnStep(|state: &WorkflowState| {
            log::info!("---STATE PRINTER---");
            log::info!("num_steps: {}", state.num_steps());
            if let Some(feedback) = state.get("json_feedback") {
                log::info!("feedback: {feedback}");
            }
            Ok(StateUpdate::silent())
        });

        let mut builder = GraphBuilder::new();
        builder.add_step("generate_summary", Arc::new(generate));
        builder.add_step("feedback", Arc::new(feedback));
        builder.add_step("edit", Arc::new(edit));
        builder.add_step("no_rewrite", Arc::new(no_rewrite));
        builder.add_step("state_printer", Arc::new(state_printer));

        builder.set_entry("generate_summary");
        builder.add_conditional_edges(
            "generate_summary",
            Arc::new(classifier),
            vec![
                ("text", Target::step("feedback")),
                ("other", Target::step("no_rewrite")),
            ],
        );
        builder.add_edge("feedback", Target::step("edit"));
        builder.add_edge("edit", Target::step("state_printer"));
        builder.add_edge("no_rewrite", Target::step("state_printer"));
        builder.add_edge("state_printer", Target::End);

        let graph = builder.compile()?;
        log::info!("summary workflow graph compiled");
        Ok(Self {
            graph,
            runner: Runner::new(),
        })
    }

    /// Run the workflow over one file's content, returning the final state
    pub async fn run_content(&self, content: &str) -> Result<WorkflowState, PipelineError> {
        let mut state = WorkflowState::new();
        state.set("initial_file", Value::String(content.to_string()));
        Ok(self.runner.run(&self.graph, state).await?)
    }

    /// Run the workflow over files in batches, checkpointing after each batch.
    ///
    /// The checkpoint (filename -> summary record) is reloaded before every
    /// batch and atomically rewritten after it, so a crash loses at most one
    /// batch of work. A failed file is recorded and skipped; a failed
    /// checkpoint write aborts the whole run.
    pub async fn run_batches(
        &self,
        files: &[PathBuf],
        config: &SummariesConfig,
    ) -> Result<BatchReport, PipelineError> {
        let mut report = BatchReport::default();
        let batch_size = config.batch_size.max(1);

        for (idx, batch) in files.chunks(batch_size).enumerate() {
            log::info!("--- summary batch {} ---", idx + 1);

            let mut checkpoint: Map<String, Value> = if config.checkpoint_file.exists() {
                load_json(&config.checkpoint_file)?
            } else {
                Map::new()
            };

            for path in batch {
                match self.summarize_file(path).await {
                    Ok(Some(record)) => {
                        let filename = file_key(path);
                        checkpoint.insert(filename, Value::Object(record));
                        report.succeeded.push(path.clone());
                        log::info!("{} summarized", path.display());
                    }
                    Ok(None) => {
                        log::info!("{} is empty, skipped", path.display());
                        report.skipped_empty.push(path.clone());
                    }
                    Err(err) => {
                        log::error!("summary of {} failed: {err}", path.display());
                        report.failed.push((path.clone(), err.to_string()));
                    }
                }
            }

            save_json(&config.checkpoint_file, &checkpoint)?;
            log::info!(
                "checkpoint written with {} summaries: {}",
                checkpoint.len(),
                config.checkpoint_file.display()
            );
        }

        log::info!(
            "all batches processed: {} ok, {} failed, {} empty",
            report.succeeded.len(),
            report.failed.len(),
            report.skipped_empty.len()
        );
        Ok(report)
    }

    /// Summarize one file. `Ok(None)` means the file was empty.
    async fn summarize_file(&self, path: &Path) -> Result<Option<Map<String, Value>>, PipelineError> {
        let content = read_text_lossy(path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        let state = self.run_content(&content).await?;
        let final_summary = state
            .get("final_json_summary")
            .ok_or_else(|| PipelineError::other("workflow finished without a final summary"))?;

        let Value::Object(fields) = final_summary else {
            return Err(PipelineError::other(format!(
                "final summary for {} is not a JSON object",
                path.display()
            )));
        };

        let mut record = Map::new();
        record.insert(
            "FILE_PATH".to_string(),
            Value::String(path.display().to_string()),
        );
        for (key, value) in fields {
            record.insert(key.clone(), value.clone());
        }
        Ok(Some(record))
    }
}

/// Drop empty-valued fields from every summary record.
///
/// Models occasionally emit keys holding an empty string, array or object
/// for fields they could not fill; downstream consumers only want the
/// populated ones. Non-object records pass through untouched.
pub fn clean_records(checkpoint: &Map<String, Value>) -> Map<String, Value> {
    checkpoint
        .iter()
        .map(|(file, record)| {
            let cleaned = match record {
                Value::Object(fields) => Value::Object(
                    fields
                        .iter()
                        .filter(|&(_, value)| !is_empty_value(value))
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect(),
                ),
                other => other.clone(),
            };
            (file.clone(), cleaned)
        })
        .collect()
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Load the summary checkpoint, filter out empty-valued fields and persist
/// the cleaned copy as its own artifact.
pub fn clean_summaries(config: &SummariesConfig) -> Result<(), PipelineError> {
    let checkpoint: Map<String, Value> = load_json(&config.checkpoint_file)?;
    let cleaned = clean_records(&checkpoint);
    save_json(&config.cleaned_file, &cleaned)?;
    log::info!(
        "cleaned summaries saved at: {}",
        config.cleaned_file.display()
    );
    Ok(())
}

fn file_key(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns canned responses in order, one per model call
    struct SequencedModel {
        responses: Vec<String>,
        cursor: AtomicUsize,
    }

    impl SequencedModel {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: responses.iter().map(|r| r.to_string()).collect(),
                cursor: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Model for SequencedModel {
        async fn generate(
            &self,
            _prompt: &str,
            _config: Option<&GenerationConfig>,
        ) -> Result<String, ModelError> {
            let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(idx)
                .cloned()
                .ok_or_else(|| ModelError::Backend("no more canned responses".to_string()))
        }
    }

    fn prompts() -> Prompts {
        Prompts {
            summary_generator: "Summarize: {content}".to_string(),
            summary_classifier: "Classify: {file}".to_string(),
            summary_feedback: "Feedback on: {draft_json}".to_string(),
            summary_editor: "Edit {file} with {feedback}".to_string(),
            schema_generator: "Schema: {dir_schema}".to_string(),
            schema_reviewer: "Review: {current_model}".to_string(),
            schema_editor: "Edit {current_model} per {feedback}".to_string(),
            structure_formatter: "Format: {JSON_FILE}".to_string(),
        }
    }

    fn workflow(model: Arc<dyn Model>) -> SummaryWorkflow {
        SummaryWorkflow::new(&prompts(), model, GenerationConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_clean_draft_takes_two_steps() {
        // generate -> classifier says "other" -> no_rewrite -> printer
        let model = SequencedModel::new(&[r#"{"summary": "fine"}"#, "other"]);
        let state = workflow(model).run_content("file body").await.unwrap();

        assert_eq!(state.num_steps(), 2);
        assert_eq!(
            state.get("final_json_summary"),
            state.get("draft_json_summary")
        );
        assert_eq!(
            state.get("final_json_summary"),
            Some(&json!({"summary": "fine"}))
        );
    }

    #[tokio::test]
    async fn test_prose_draft_takes_three_steps() {
        // generate -> "text" -> feedback -> edit -> printer
        let model = SequencedModel::new(&[
            r#"{"summary": "mangled"}"#,
            "text",
            r#"{"issue": "keys missing"}"#,
            r#"{"summary": "repaired"}"#,
        ]);
        let state = workflow(model).run_content("file body").await.unwrap();

        assert_eq!(state.num_steps(), 3);
        assert_eq!(
            state.get("final_json_summary"),
            Some(&json!({"summary": "repaired"}))
        );
        assert_eq!(
            state.get("json_feedback"),
            Some(&json!({"issue": "keys missing"}))
        );
    }

    #[tokio::test]
    async fn test_unknown_classifier_answer_aborts() {
        let model = SequencedModel::new(&[r#"{"summary": "x"}"#, "maybe"]);
        let err = workflow(model).run_content("body").await.unwrap_err();

        assert!(err.to_string().contains("maybe"));
    }

    #[tokio::test]
    async fn test_batch_checkpoints_good_files_and_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.py");
        let bad = dir.path().join("bad.py");
        let empty = dir.path().join("empty.py");
        fs::write(&good, "def f(): pass").unwrap();
        fs::write(&bad, "def g(): pass").unwrap();
        fs::write(&empty, "  \n").unwrap();

        // good.py succeeds on the short path; bad.py's generator returns
        // garbage that fails JSON parsing
        let model = SequencedModel::new(&[r#"{"summary": "ok"}"#, "other", "not json at all"]);
        let config = SummariesConfig {
            checkpoint_file: dir.path().join("summaries.json"),
            cleaned_file: dir.path().join("summaries_clean.json"),
            batch_size: 5,
        };

        let report = workflow(model)
            .run_batches(&[good.clone(), bad.clone(), empty], &config)
            .await
            .unwrap();

        assert_eq!(report.succeeded, vec![good]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, bad);
        assert_eq!(report.skipped_empty.len(), 1);

        let checkpoint: Map<String, Value> = load_json(&config.checkpoint_file).unwrap();
        assert_eq!(checkpoint.len(), 1);
        let record = checkpoint.get("good.py").unwrap();
        assert_eq!(record["summary"], "ok");
        assert!(record["FILE_PATH"].as_str().unwrap().ends_with("good.py"));
    }

    #[tokio::test]
    async fn test_batch_merges_into_existing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("new.py");
        fs::write(&file, "x = 1").unwrap();

        let config = SummariesConfig {
            checkpoint_file: dir.path().join("summaries.json"),
            cleaned_file: dir.path().join("summaries_clean.json"),
            batch_size: 5,
        };
        let mut existing = Map::new();
        existing.insert("old.py".to_string(), json!({"summary": "kept"}));
        save_json(&config.checkpoint_file, &existing).unwrap();

        let model = SequencedModel::new(&[r#"{"summary": "new"}"#, "other"]);
        workflow(model)
            .run_batches(&[file], &config)
            .await
            .unwrap();

        let checkpoint: Map<String, Value> = load_json(&config.checkpoint_file).unwrap();
        assert_eq!(checkpoint.len(), 2);
        assert_eq!(checkpoint["old.py"]["summary"], "kept");
        assert_eq!(checkpoint["new.py"]["summary"], "new");
    }

    #[test]
    fn test_clean_records_drops_empty_fields() {
        let mut checkpoint = Map::new();
        checkpoint.insert(
            "a.py".to_string(),
            json!({
                "summary": "parses config",
                "language": "",
                "public_api": [],
                "dependencies": null,
                "extras": {},
                "line_count": 0
            }),
        );

        let cleaned = clean_records(&checkpoint);
        assert_eq!(
            cleaned["a.py"],
            json!({"summary": "parses config", "line_count": 0})
        );
    }

    #[test]
    fn test_clean_summaries_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = SummariesConfig {
            checkpoint_file: dir.path().join("summaries.json"),
            cleaned_file: dir.path().join("summaries_clean.json"),
            batch_size: 5,
        };

        let mut checkpoint = Map::new();
        checkpoint.insert(
            "a.py".to_string(),
            json!({"summary": "fine", "dependencies": []}),
        );
        save_json(&config.checkpoint_file, &checkpoint).unwrap();

        clean_summaries(&config).unwrap();

        let cleaned: Map<String, Value> = load_json(&config.cleaned_file).unwrap();
        assert_eq!(cleaned["a.py"], json!({"summary": "fine"}));
        // the checkpoint itself is left as written
        let original: Map<String, Value> = load_json(&config.checkpoint_file).unwrap();
        assert!(original["a.py"].get("dependencies").is_some());
    }
}
