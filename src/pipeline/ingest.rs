// SPDX-License-Identifier: MIT

//! Text ingestion: chunk scraped pages and embed every chunk
//!
//! Scraped pages arrive as JSON documents with the page text and its source
//! metadata. The chunker splits the text on a separator and greedily packs
//! the pieces into size-bounded chunks with a configurable overlap carried
//! between consecutive chunks. Each chunk is embedded and written as one CSV
//! row for the validation and upload stages.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::config::IngestConfig;
use crate::error::PipelineError;
use crate::llm::embeddings::Embedder;
use crate::util::{list_files, load_json};

/// One scraped page as produced by the scraper. Pages without text are
/// skipped during processing.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapedPage {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub date_scraped_timestamp: i64,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub page_title: String,
    #[serde(default)]
    pub url: String,
}

/// One embedded chunk, the unit the vector index stores
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub text: String,
    pub host: String,
    pub page_title: String,
    pub url: String,
}

/// Separator-based chunker with greedy packing and overlap
#[derive(Debug, Clone)]
pub struct TextChunker {
    separator: String,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    pub fn new(separator: impl Into<String>, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            separator: separator.into(),
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(
            config.separator.clone(),
            config.chunk_size,
            config.chunk_overlap,
        )
    }

    fn joined_len(&self, pieces: &[&str]) -> usize {
        if pieces.is_empty() {
            return 0;
        }
        let content: usize = pieces.iter().map(|p| p.len()).sum();
        content + self.separator.len() * (pieces.len() - 1)
    }

    /// Split text into chunks of at most `chunk_size` characters (single
    /// oversized pieces are kept whole). The tail of each chunk, up to
    /// `chunk_overlap` characters of whole pieces, is repeated at the start
    /// of the next chunk.
    pub fn split(&self, text: &str) -> Vec<String> {
        let pieces: Vec<&str> = text
            .split(self.separator.as_str())
            .filter(|p| !p.is_empty())
            .collect();

        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for piece in pieces {
            let would_be = self.joined_len(&current) + self.separator.len() + piece.len();
            if !current.is_empty() && would_be > self.chunk_size {
                chunks.push(current.join(&self.separator));
                // keep a tail of whole pieces within the overlap budget
                while !current.is_empty()
                    && (self.joined_len(&current) > self.chunk_overlap
                        || self.joined_len(&current) + self.separator.len() + piece.len()
                            > self.chunk_size)
                {
                    current.remove(0);
                }
            }
            current.push(piece);
        }
        if !current.is_empty() {
            chunks.push(current.join(&self.separator));
        }
        chunks
    }
}

/// Chunks pages and embeds every chunk
pub struct TextProcessor {
    chunker: TextChunker,
    embedder: Arc<dyn Embedder>,
}

impl TextProcessor {
    pub fn new(chunker: TextChunker, embedder: Arc<dyn Embedder>) -> Self {
        Self { chunker, embedder }
    }

    /// Process pages into embedded chunk records. Chunk ids are
    /// `<scrape timestamp>-<sequence>` with the sequence global over the
    /// whole run, so ids stay unique across pages scraped the same second.
    pub async fn process(&self, pages: &[ScrapedPage]) -> Result<Vec<ChunkRecord>, PipelineError> {
        let mut records = Vec::new();
        let mut seq = 0usize;

        for page in pages {
            let Some(text) = page.text.as_deref().filter(|t| !t.trim().is_empty()) else {
                log::info!("page without text skipped: {}", page.url);
                continue;
            };

            let chunks: Vec<String> = self.chunker.split(text);
            let vectors = self
                .embedder
                .embed(&chunks)
                .await
                .map_err(|e| PipelineError::other(e.to_string()))?;

            for (chunk, vector) in chunks.into_iter().zip(vectors) {
                records.push(ChunkRecord {
                    id: format!("{}-{}", page.date_scraped_timestamp, seq),
                    values: vector,
                    text: chunk,
                    host: page.host.clone(),
                    page_title: page.page_title.clone(),
                    url: page.url.clone(),
                });
                seq += 1;
            }
        }

        log::info!("text processed and chunked, total chunks: {}", records.len());
        Ok(records)
    }
}

/// Load scraped pages from every JSON file under a directory. A file may
/// hold one page object or an array of them.
pub fn load_pages(source_dir: &Path) -> Result<Vec<ScrapedPage>, PipelineError> {
    let mut pages = Vec::new();
    for path in list_files(source_dir)? {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let value: serde_json::Value = load_json(&path)?;
        match value {
            serde_json::Value::Array(items) => {
                for item in items {
                    pages.push(serde_json::from_value(item)?);
                }
            }
            other => pages.push(serde_json::from_value(other)?),
        }
    }
    log::info!("{} scraped pages loaded from {}", pages.len(), source_dir.display());
    Ok(pages)
}

/// Write chunk records to the CSV handed to the upload stage. The embedding
/// vector is serialized as a JSON array in the `values` column.
pub fn write_csv(path: &Path, records: &[ChunkRecord]) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["id", "values", "text", "host", "page_title", "url"])?;
    for record in records {
        let values = serde_json::to_string(&record.values)?;
        writer.write_record([
            record.id.as_str(),
            values.as_str(),
            record.text.as_str(),
            record.host.as_str(),
            record.page_title.as_str(),
            record.url.as_str(),
        ])?;
    }
    writer.flush().map_err(|e| PipelineError::persistence(path, e))?;
    log::info!("{} chunk records saved at: {}", records.len(), path.display());
    Ok(())
}

/// Run the whole ingestion stage: load, chunk, embed, write CSV
pub async fn run(config: &IngestConfig, embedder: Arc<dyn Embedder>) -> Result<usize, PipelineError> {
    let pages = load_pages(&config.source_dir)?;
    let processor = TextProcessor::new(TextChunker::from_config(config), embedder);
    let records = processor.process(&pages).await?;
    write_csv(&config.chunk_csv, &records)?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelError;
    use async_trait::async_trait;
    use std::fs;

    /// Deterministic embedder: the vector encodes the text length
    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn page(text: &str, timestamp: i64) -> ScrapedPage {
        ScrapedPage {
            text: Some(text.to_string()),
            date_scraped_timestamp: timestamp,
            host: "docs.example.com".to_string(),
            page_title: "Guide".to_string(),
            url: "https://docs.example.com/guide".to_string(),
        }
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = TextChunker::new("\n", 100, 20);
        assert_eq!(chunker.split("one\ntwo\nthree"), vec!["one\ntwo\nthree"]);
    }

    #[test]
    fn test_chunks_respect_size_and_overlap() {
        let chunker = TextChunker::new("\n", 12, 5);
        let chunks = chunker.split("aaaa\nbbbb\ncccc\ndddd");

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 12, "chunk too long: {chunk:?}");
        }
        // overlap: the last piece of a chunk reappears in the next one
        assert!(chunks[1].starts_with("bbbb") || chunks[1].starts_with("cccc"));
        // nothing is lost
        let joined = chunks.join("\n");
        for piece in ["aaaa", "bbbb", "cccc", "dddd"] {
            assert!(joined.contains(piece));
        }
    }

    #[test]
    fn test_oversized_piece_kept_whole() {
        let chunker = TextChunker::new("\n", 5, 0);
        let chunks = chunker.split("tiny\nthis-piece-is-far-too-long\nend");
        assert!(chunks.contains(&"this-piece-is-far-too-long".to_string()));
    }

    #[tokio::test]
    async fn test_process_assigns_global_sequence_ids() {
        let processor = TextProcessor::new(TextChunker::new("\n", 6, 0), Arc::new(LengthEmbedder));
        let pages = vec![page("aaaa\nbbbb", 1700000000), page("cccc", 1700000000)];

        let records = processor.process(&pages).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, "1700000000-0");
        assert_eq!(records[1].id, "1700000000-1");
        assert_eq!(records[2].id, "1700000000-2");
        assert_eq!(records[0].values, vec![4.0, 1.0]);
        assert_eq!(records[2].host, "docs.example.com");
    }

    #[tokio::test]
    async fn test_pages_without_text_are_skipped() {
        let processor = TextProcessor::new(TextChunker::new("\n", 100, 0), Arc::new(LengthEmbedder));
        let pages = vec![
            ScrapedPage {
                text: None,
                date_scraped_timestamp: 1,
                host: String::new(),
                page_title: String::new(),
                url: "https://x".to_string(),
            },
            page("real content", 2),
        ];

        let records = processor.process(&pages).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "2-0");
    }

    #[test]
    fn test_csv_round_trip_preserves_values_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.csv");
        let records = vec![ChunkRecord {
            id: "1-0".to_string(),
            values: vec![0.5, -1.25],
            text: "chunk, with comma".to_string(),
            host: "h".to_string(),
            page_title: "t".to_string(),
            url: "u".to_string(),
        }];

        write_csv(&path, &records).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers, &csv::StringRecord::from(vec![
            "id", "values", "text", "host", "page_title", "url"
        ]));

        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[0], "1-0");
        let values: Vec<f32> = serde_json::from_str(&row[1]).unwrap();
        assert_eq!(values, vec![0.5, -1.25]);
        assert_eq!(&row[2], "chunk, with comma");
    }

    #[test]
    fn test_load_pages_accepts_object_and_array_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("single.json"),
            r#"{"text": "a", "date_scraped_timestamp": 1, "host": "h", "page_title": "t", "url": "u"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("many.json"),
            r#"[{"text": "b"}, {"text": "c"}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let pages = load_pages(dir.path()).unwrap();
        assert_eq!(pages.len(), 3);
    }
}
