// SPDX-License-Identifier: MIT

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dotenv::dotenv;

use vectorpipe::config::AppConfig;
use vectorpipe::llm::embeddings::OpenAiEmbedder;
use vectorpipe::llm::groq::GroqModel;
use vectorpipe::llm::{GenerationConfig, Model};
use vectorpipe::pipeline::{changes, ingest, schema, structure, summaries, upload, validate};
use vectorpipe::util::load_set;
use vectorpipe::workflow::{ConsoleReviewer, Reviewer};
use vectorpipe::PipelineError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the pipeline configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect added, deleted and changed files among the monitored set
    Monitor,
    /// Introspect the source tree and produce the structure artifacts
    Structure,
    /// Run the summary workflow over the monitored files
    Summarize,
    /// Run the graph-schema workflow over the formatted structure
    Schema {
        /// Review the agent feedback interactively before editing
        #[arg(long)]
        human_review: bool,
    },
    /// Chunk and embed scraped pages into the chunk CSV
    Ingest,
    /// Validate the chunk CSV against the declared schema
    Validate,
    /// Upload the validated vectors to the index
    Upload {
        /// Delete and recreate the index before uploading
        #[arg(long)]
        recreate_index: bool,
    },
    /// Run ingestion, validation and upload back to back
    Pipeline,
}

fn chat_model(config: &AppConfig) -> Result<Arc<dyn Model>, PipelineError> {
    let timeout = Duration::from_secs(config.model.request_timeout_secs);
    let model = GroqModel::new(&config.model.model_name, timeout)
        .map_err(|e| PipelineError::config(e.to_string()))?;
    log::info!("working with model: {}", config.model.model_name);
    Ok(Arc::new(model))
}

fn generation(config: &AppConfig) -> GenerationConfig {
    GenerationConfig {
        temperature: Some(config.model.temperature),
        max_output_tokens: None,
    }
}

fn embedder(config: &AppConfig) -> Result<Arc<OpenAiEmbedder>, PipelineError> {
    let timeout = Duration::from_secs(config.model.request_timeout_secs);
    let embedder = OpenAiEmbedder::new(&config.ingest.embedding_model, timeout)
        .map_err(|e| PipelineError::config(e.to_string()))?;
    Ok(Arc::new(embedder))
}

async fn run_ingest(config: &AppConfig) -> Result<(), PipelineError> {
    let chunks = ingest::run(&config.ingest, embedder(config)?).await?;
    log::info!("ingestion finished with {chunks} chunks");
    Ok(())
}

fn run_validate(config: &AppConfig) -> Result<(), PipelineError> {
    let passed = validate::DataValidation::new(&config.validate).run()?;
    if !passed {
        return Err(PipelineError::other("chunk CSV failed validation"));
    }
    Ok(())
}

async fn run_upload(config: &AppConfig, recreate: bool) -> Result<(), PipelineError> {
    let uploader = upload::DataUpload::new(&config.upload)?;
    let uploaded = uploader.run(recreate).await?;
    log::info!("upload finished with {uploaded} vectors");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = AppConfig::load(&args.config)?;

    match args.command {
        Commands::Monitor => {
            let monitor = changes::FileStateMonitor::new(&config.monitor);
            let detected = monitor.monitor()?;
            log::info!(
                "changes written to {}: {:?}",
                config.monitor.updated_files.display(),
                detected
            );
        }
        Commands::Structure => {
            let model = chat_model(&config)?;
            let stage = structure::CodeStructure::new(
                &config.structure,
                &config.prompts,
                model,
                generation(&config),
            );
            stage.run().await?;
        }
        Commands::Summarize => {
            let model = chat_model(&config)?;
            let workflow =
                summaries::SummaryWorkflow::new(&config.prompts, model, generation(&config))?;
            let files: Vec<PathBuf> = load_set(&config.monitor.monitor_files)?
                .into_iter()
                .map(PathBuf::from)
                .collect();
            let report = workflow.run_batches(&files, &config.summaries).await?;
            log::info!(
                "summaries: {} ok, {} failed, {} empty",
                report.succeeded.len(),
                report.failed.len(),
                report.skipped_empty.len()
            );
            for (path, err) in &report.failed {
                log::warn!("failed: {}: {err}", path.display());
            }
            if config.summaries.checkpoint_file.exists() {
                summaries::clean_summaries(&config.summaries)?;
            }
        }
        Commands::Schema { human_review } => {
            let model = chat_model(&config)?;
            let reviewer: Option<Arc<dyn Reviewer>> = if human_review || config.schema.human_review
            {
                Some(Arc::new(ConsoleReviewer))
            } else {
                None
            };
            let workflow =
                schema::SchemaWorkflow::new(&config.prompts, model, generation(&config), reviewer)?;
            workflow.run_and_save(&config.schema).await?;
        }
        Commands::Ingest => run_ingest(&config).await?,
        Commands::Validate => run_validate(&config)?,
        Commands::Upload { recreate_index } => run_upload(&config, recreate_index).await?,
        Commands::Pipeline => {
            log::info!(">>>>>>> stage Data Ingestion started <<<<<<<");
            run_ingest(&config).await?;
            log::info!(">>>>>>> stage Data Ingestion completed <<<<<<<");

            log::info!(">>>>>>> stage Data Validation started <<<<<<<");
            run_validate(&config)?;
            log::info!(">>>>>>> stage Data Validation completed <<<<<<<");

            log::info!(">>>>>>> stage Data Upload started <<<<<<<");
            run_upload(&config, false).await?;
            log::info!(">>>>>>> stage Data Upload completed <<<<<<<");
        }
    }

    Ok(())
}
