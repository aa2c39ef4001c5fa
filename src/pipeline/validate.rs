// SPDX-License-Identifier: MIT

//! Chunk CSV validation
//!
//! Checks the artifact handed to the upload stage: every column must be
//! declared by the configured schema (with `id` and `values` always implied)
//! and the `id` column must be unique. Each check appends one line to the
//! status file so a pipeline run leaves an auditable trail.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::config::ValidateConfig;
use crate::error::PipelineError;

fn append_status(path: &Path, line: &str) -> Result<(), PipelineError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| PipelineError::persistence(path, e))?;
    writeln!(file, "{line}").map_err(|e| PipelineError::persistence(path, e))?;
    Ok(())
}

/// Validates the chunk CSV against the configured schema
pub struct DataValidation<'a> {
    config: &'a ValidateConfig,
}

impl<'a> DataValidation<'a> {
    pub fn new(config: &'a ValidateConfig) -> Self {
        Self { config }
    }

    /// Check that every CSV column is declared by the schema
    pub fn validate_all_columns(&self) -> Result<bool, PipelineError> {
        let mut reader = csv::Reader::from_path(&self.config.read_data_dir)?;
        let headers = reader.headers()?.clone();

        let mut allowed: HashSet<&str> = self.config.columns.iter().map(|c| c.as_str()).collect();
        allowed.insert("id");
        allowed.insert("values");

        let status = headers.iter().all(|col| allowed.contains(col));
        append_status(
            &self.config.status_file,
            &format!("All columns present in data: {status}"),
        )?;
        log::info!("all columns present in data: {status}");
        Ok(status)
    }

    /// Check that the `id` column holds no duplicates
    pub fn validate_unique_ids(&self) -> Result<bool, PipelineError> {
        let mut reader = csv::Reader::from_path(&self.config.read_data_dir)?;
        let headers = reader.headers()?.clone();
        let id_idx = headers
            .iter()
            .position(|col| col == "id")
            .ok_or_else(|| PipelineError::other("chunk CSV has no id column"))?;

        let mut seen = HashSet::new();
        let mut total = 0usize;
        for row in reader.records() {
            let row = row?;
            if let Some(id) = row.get(id_idx) {
                seen.insert(id.to_string());
            }
            total += 1;
        }

        let status = seen.len() == total;
        append_status(&self.config.status_file, &format!("Unique ids: {status}"))?;
        log::info!("unique ids: {status}");
        Ok(status)
    }

    /// Run both checks; true iff the artifact passes all of them
    pub fn run(&self) -> Result<bool, PipelineError> {
        let columns_ok = self.validate_all_columns()?;
        let ids_ok = self.validate_unique_ids()?;
        Ok(columns_ok && ids_ok)
    }
}
