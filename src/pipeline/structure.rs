// SPDX-License-Identifier: MIT

//! Source-tree introspection
//!
//! Walks the configured source tree, skipping everything the ignore rules
//! (derived from .gitignore plus configured extras) exclude, and produces
//! three artifacts: the combined ignore set, the raw directory structure as
//! JSON, and an LLM-formatted description of that structure used as input to
//! the schema workflow.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{Prompts, StructureConfig};
use crate::error::PipelineError;
use crate::llm::{GenerationConfig, Model};
use crate::util::{read_text_lossy, save_json, save_set};
use crate::workflow::PromptTemplate;

/// Name and suffix rules parsed out of a .gitignore
#[derive(Debug, Default, Clone)]
pub struct IgnoreRules {
    names: BTreeSet<String>,
    extensions: BTreeSet<String>,
}

impl IgnoreRules {
    /// Parse .gitignore content. Leading-`*` patterns become suffix rules,
    /// everything else a plain name rule; trailing `/` and `*` markers are
    /// stripped. Comments and blank lines are skipped.
    pub fn parse(content: &str) -> Self {
        let mut rules = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix('*') {
                let ext = rest.strip_suffix('/').unwrap_or(rest);
                rules.extensions.insert(ext.to_string());
            } else if let Some(name) = line.strip_suffix('/') {
                rules.names.insert(name.to_string());
            } else if let Some(name) = line.strip_suffix("/*") {
                rules.names.insert(name.to_string());
            } else {
                rules.names.insert(line.to_string());
            }
        }
        rules
    }

    /// Add plain names on top of the parsed rules
    pub fn add_names<I: IntoIterator<Item = String>>(&mut self, names: I) {
        self.names.extend(names);
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.names.contains(name) || self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    /// The full rule set as one flat set, for the ignore artifact
    pub fn combined(&self) -> BTreeSet<String> {
        self.names.union(&self.extensions).cloned().collect()
    }
}

/// Listing of one directory after filtering
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct DirListing {
    pub directories: Vec<String>,
    pub files: Vec<String>,
}

/// Directory path (relative to the root, root itself as `.`) -> its listing
pub type DirectoryStructure = BTreeMap<String, DirListing>;

fn list_directory(path: &Path, rules: &IgnoreRules) -> Result<DirListing, PipelineError> {
    let mut listing = DirListing::default();
    let entries = fs::read_dir(path).map_err(|e| PipelineError::persistence(path, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::persistence(path, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if rules.is_ignored(&name) {
            continue;
        }
        if entry.path().is_dir() {
            listing.directories.push(name);
        } else {
            listing.files.push(name);
        }
    }
    listing.directories.sort();
    listing.files.sort();
    Ok(listing)
}

/// Recursively build the filtered directory structure of `root`
pub fn build_directory_structure(
    root: &Path,
    rules: &IgnoreRules,
) -> Result<DirectoryStructure, PipelineError> {
    fn walk(
        root: &Path,
        relative: &str,
        rules: &IgnoreRules,
        out: &mut DirectoryStructure,
    ) -> Result<(), PipelineError> {
        let path = if relative == "." {
            root.to_path_buf()
        } else {
            root.join(relative)
        };
        let listing = list_directory(&path, rules)?;
        let subdirs = listing.directories.clone();
        out.insert(relative.to_string(), listing);
        for subdir in subdirs {
            let child = if relative == "." {
                subdir
            } else {
                format!("{relative}/{subdir}")
            };
            walk(root, &child, rules, out)?;
        }
        Ok(())
    }

    let mut structure = DirectoryStructure::new();
    walk(root, ".", rules, &mut structure)?;
    Ok(structure)
}

/// Drives the introspection stage end to end
pub struct CodeStructure<'a> {
    config: &'a StructureConfig,
    prompts: &'a Prompts,
    model: Arc<dyn Model>,
    generation: GenerationConfig,
}

impl<'a> CodeStructure<'a> {
    pub fn new(
        config: &'a StructureConfig,
        prompts: &'a Prompts,
        model: Arc<dyn Model>,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            config,
            prompts,
            model,
            generation,
        }
    }

    fn load_ignore_rules(&self) -> Result<IgnoreRules, PipelineError> {
        let content = read_text_lossy(&self.config.gitignore_path)?;
        let mut rules = IgnoreRules::parse(&content);
        rules.add_names(self.config.files_to_ignore.iter().cloned());
        log::info!(
            "ignore rules loaded from: {}",
            self.config.gitignore_path.display()
        );
        Ok(rules)
    }

    async fn format_structure(&self, structure: &DirectoryStructure) -> Result<String, PipelineError> {
        let template = PromptTemplate::new(&self.prompts.structure_formatter, &["JSON_FILE"]);
        let structure_json = serde_json::to_string_pretty(structure)?;
        let mut values = std::collections::HashMap::new();
        values.insert("JSON_FILE", structure_json);
        let prompt = template
            .fill(&values)
            .map_err(|e| PipelineError::other(e.to_string()))?;
        let formatted = self
            .model
            .generate(&prompt, Some(&self.generation))
            .await
            .map_err(|e| PipelineError::other(e.to_string()))?;
        Ok(formatted)
    }

    /// Build and persist all three structure artifacts
    pub async fn run(&self) -> Result<DirectoryStructure, PipelineError> {
        let rules = self.load_ignore_rules()?;
        save_set(&self.config.ignored_files_artifact, &rules.combined())?;

        let structure = build_directory_structure(&self.config.code_dir, &rules)?;
        save_json(&self.config.directory_structure_file, &structure)?;
        log::info!(
            "directory structure saved at: {}",
            self.config.directory_structure_file.display()
        );

        let formatted = self.format_structure(&structure).await?;
        fs::write(&self.config.structure_file, formatted)
            .map_err(|e| PipelineError::persistence(&self.config.structure_file, e))?;
        log::info!(
            "formatted structure saved at: {}",
            self.config.structure_file.display()
        );
        Ok(structure)
    }
}
