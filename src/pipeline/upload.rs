// SPDX-License-Identifier: MIT

//! Vector upload to a Pinecone-style index
//!
//! A thin REST client over the controller API (index lifecycle) and the data
//! plane (upserts, stats), plus the upload driver that reads the validated
//! chunk CSV and pushes vectors in batches.

use std::env;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{IndexConfig, UploadConfig};
use crate::error::PipelineError;

const DEFAULT_CONTROLLER_URL: &str = "https://api.pinecone.io";
const READINESS_ATTEMPTS: u32 = 60;

/// Metadata stored next to each vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub text: String,
    pub host: String,
    pub page_title: String,
    pub url: String,
}

/// One vector as the index ingests it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// Read vector records back out of the chunk CSV. The `values` column holds
/// the embedding as a JSON array.
pub fn read_records(path: &Path) -> Result<Vec<VectorRecord>, PipelineError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let col = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| PipelineError::other(format!("chunk CSV has no {name} column")))
    };
    let (id_idx, values_idx) = (col("id")?, col("values")?);
    let (text_idx, host_idx) = (col("text")?, col("host")?);
    let (title_idx, url_idx) = (col("page_title")?, col("url")?);

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let field = |idx: usize| row.get(idx).unwrap_or_default().to_string();
        let values: Vec<f32> = serde_json::from_str(row.get(values_idx).unwrap_or_default())
            .map_err(|e| PipelineError::other(format!("bad values column in row {}: {e}", field(id_idx))))?;
        records.push(VectorRecord {
            id: field(id_idx),
            values,
            metadata: VectorMetadata {
                text: field(text_idx),
                host: field(host_idx),
                page_title: field(title_idx),
                url: field(url_idx),
            },
        });
    }
    log::info!("{} vectors ready for upload", records.len());
    Ok(records)
}

/// REST client for the vector index service
pub struct VectorIndexClient {
    client: Client,
    api_key: String,
    controller_url: String,
}

impl VectorIndexClient {
    /// Requires `PINECONE_API_KEY`; `PINECONE_CONTROLLER_URL` overrides the
    /// controller endpoint.
    pub fn new() -> Result<Self, PipelineError> {
        let api_key = env::var("PINECONE_API_KEY")
            .map_err(|_| PipelineError::config("PINECONE_API_KEY must be set"))?;
        let controller_url = env::var("PINECONE_CONTROLLER_URL")
            .unwrap_or_else(|_| DEFAULT_CONTROLLER_URL.to_string());
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            api_key,
            controller_url,
        })
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<Value, PipelineError> {
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::other(format!(
                "{what} failed ({status}): {text}"
            )));
        }
        if resp.content_length() == Some(0) {
            return Ok(Value::Null);
        }
        Ok(resp.json().await.unwrap_or(Value::Null))
    }

    /// Names of all existing indexes
    pub async fn list_indexes(&self) -> Result<Vec<String>, PipelineError> {
        let resp = self
            .client
            .get(format!("{}/indexes", self.controller_url))
            .header("Api-Key", &self.api_key)
            .send()
            .await?;
        let body = Self::check(resp, "list indexes").await?;
        let names = body["indexes"]
            .as_array()
            .map(|indexes| {
                indexes
                    .iter()
                    .filter_map(|i| i["name"].as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }

    /// Delete the index if it exists
    pub async fn delete_index(&self, name: &str) -> Result<(), PipelineError> {
        if !self.list_indexes().await?.contains(&name.to_string()) {
            return Ok(());
        }
        let resp = self
            .client
            .delete(format!("{}/indexes/{name}", self.controller_url))
            .header("Api-Key", &self.api_key)
            .send()
            .await?;
        Self::check(resp, "delete index").await?;
        log::info!("index '{name}' deleted");
        Ok(())
    }

    /// Create the index if absent and wait (bounded) for it to become ready
    pub async fn create_index(&self, config: &IndexConfig) -> Result<(), PipelineError> {
        if self.list_indexes().await?.contains(&config.name) {
            log::info!("index '{}' already exists", config.name);
            return Ok(());
        }

        let body = json!({
            "name": config.name,
            "dimension": config.dimension,
            "metric": config.metric,
            "spec": {"pod": {"environment": config.environment}}
        });
        let resp = self
            .client
            .post(format!("{}/indexes", self.controller_url))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        Self::check(resp, "create index").await?;

        for _ in 0..READINESS_ATTEMPTS {
            let described = self.describe_index(&config.name).await?;
            if described["status"]["ready"].as_bool().unwrap_or(false) {
                log::info!("index '{}' created and ready", config.name);
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Err(PipelineError::other(format!(
            "index '{}' not ready after {READINESS_ATTEMPTS} seconds",
            config.name
        )))
    }

    async fn describe_index(&self, name: &str) -> Result<Value, PipelineError> {
        let resp = self
            .client
            .get(format!("{}/indexes/{name}", self.controller_url))
            .header("Api-Key", &self.api_key)
            .send()
            .await?;
        Self::check(resp, "describe index").await
    }

    /// Data-plane host of the index
    pub async fn index_host(&self, name: &str) -> Result<String, PipelineError> {
        let described = self.describe_index(name).await?;
        described["host"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| PipelineError::other(format!("index '{name}' reports no host")))
    }

    /// Upsert one batch of vectors
    pub async fn upsert(&self, host: &str, vectors: &[VectorRecord]) -> Result<(), PipelineError> {
        let resp = self
            .client
            .post(format!("https://{host}/vectors/upsert"))
            .header("Api-Key", &self.api_key)
            .json(&json!({"vectors": vectors}))
            .send()
            .await?;
        Self::check(resp, "upsert").await?;
        Ok(())
    }

    /// Current index statistics
    pub async fn index_stats(&self, host: &str) -> Result<Value, PipelineError> {
        let resp = self
            .client
            .post(format!("https://{host}/describe_index_stats"))
            .header("Api-Key", &self.api_key)
            .json(&json!({}))
            .send()
            .await?;
        Self::check(resp, "index stats").await
    }
}

/// The upload stage driver
pub struct DataUpload<'a> {
    config: &'a UploadConfig,
    client: VectorIndexClient,
}

impl<'a> DataUpload<'a> {
    pub fn new(config: &'a UploadConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            config,
            client: VectorIndexClient::new()?,
        })
    }

    fn append_status(&self, line: &str) -> Result<(), PipelineError> {
        use std::io::Write;
        let path = &self.config.status_file;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| PipelineError::persistence(path, e))?;
        writeln!(file, "{line}").map_err(|e| PipelineError::persistence(path, e))?;
        Ok(())
    }

    /// Recreate the index if configured, then upload all vectors in batches
    pub async fn run(&self, recreate: bool) -> Result<usize, PipelineError> {
        let records = read_records(&self.config.read_data_dir)?;
        self.append_status(&format!("Data size: {}", records.len()))?;

        if recreate || self.config.delete_index {
            self.client.delete_index(&self.config.index.name).await?;
        }
        self.client.create_index(&self.config.index).await?;
        let host = self.client.index_host(&self.config.index.name).await?;

        let batch_size = self.config.batch_size.max(1);
        let batch_count = records.len().div_ceil(batch_size);
        log::info!(
            "uploading {} vectors in {} batches",
            records.len(),
            batch_count
        );

        for (i, batch) in records.chunks(batch_size).enumerate() {
            self.client.upsert(&host, batch).await?;
            log::info!("batch {}/{} uploaded", i + 1, batch_count);
        }

        let stats = self.client.index_stats(&host).await?;
        log::info!("index stats after upload: {stats}");
        self.append_status("Data upload completed")?;
        Ok(records.len())
    }
}
