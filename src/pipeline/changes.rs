// SPDX-License-Identifier: MIT

//! File-change detection via content hashing
//!
//! The monitor hashes every tracked file with MD5, diffs the new hash map
//! against the persisted one and classifies each file as added, deleted or
//! changed. Mtime is deliberately not consulted: a rewrite with identical
//! content is not a change.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::config::MonitorConfig;
use crate::error::PipelineError;
use crate::util::{load_json, load_set, save_json};

/// Classification of the diff between two hash states
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChanges {
    pub added_files: Vec<String>,
    pub deleted_files: Vec<String>,
    pub changed_files: Vec<String>,
}

impl FileChanges {
    pub fn is_empty(&self) -> bool {
        self.added_files.is_empty()
            && self.deleted_files.is_empty()
            && self.changed_files.is_empty()
    }
}

/// Compute the MD5 hex digest of a file's content
pub fn file_md5(path: &Path) -> Result<String, PipelineError> {
    let bytes = fs::read(path).map_err(|e| PipelineError::persistence(path, e))?;
    let mut hasher = Md5::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Diff two filename -> hash states. Pure; output lists are sorted so the
/// artifact is stable across runs over the same inputs.
pub fn compare(old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> FileChanges {
    let added_files = new
        .keys()
        .filter(|name| !old.contains_key(*name))
        .cloned()
        .collect();
    let deleted_files = old
        .keys()
        .filter(|name| !new.contains_key(*name))
        .cloned()
        .collect();
    let changed_files = new
        .iter()
        .filter(|(name, hash)| old.get(*name).is_some_and(|h| h != *hash))
        .map(|(name, _)| name.clone())
        .collect();

    FileChanges {
        added_files,
        deleted_files,
        changed_files,
    }
}

/// Monitors a configured set of files for content changes between runs
pub struct FileStateMonitor<'a> {
    config: &'a MonitorConfig,
}

impl<'a> FileStateMonitor<'a> {
    pub fn new(config: &'a MonitorConfig) -> Self {
        Self { config }
    }

    fn current_state(&self) -> Result<BTreeMap<String, String>, PipelineError> {
        let files = load_set(&self.config.monitor_files)?;
        let mut state = BTreeMap::new();
        for file in files {
            let hash = file_md5(Path::new(&file))?;
            state.insert(file, hash);
        }
        Ok(state)
    }

    /// Hash the monitored files, classify changes against the persisted
    /// state, write the classification artifact and persist the new state.
    pub fn monitor(&self) -> Result<FileChanges, PipelineError> {
        let old_state: BTreeMap<String, String> = if self.config.state_file.exists() {
            load_json(&self.config.state_file)?
        } else {
            log::info!("no previous file state, treating all files as added");
            BTreeMap::new()
        };

        let new_state = self.current_state()?;
        let changes = compare(&old_state, &new_state);
        log::info!(
            "file changes: {} added, {} deleted, {} changed",
            changes.added_files.len(),
            changes.deleted_files.len(),
            changes.changed_files.len()
        );

        save_json(&self.config.updated_files, &changes)?;
        save_json(&self.config.state_file, &new_state)?;
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_identical_states_have_no_changes() {
        let s = state(&[("a.py", "h1"), ("b.py", "h2")]);
        assert!(compare(&s, &s).is_empty());
    }

    #[test]
    fn test_added_and_deleted_are_symmetric() {
        let old = state(&[("a.py", "h1")]);
        let new = state(&[("b.py", "h2")]);

        let forward = compare(&old, &new);
        assert_eq!(forward.added_files, vec!["b.py"]);
        assert_eq!(forward.deleted_files, vec!["a.py"]);
        assert!(forward.changed_files.is_empty());

        let backward = compare(&new, &old);
        assert_eq!(backward.added_files, forward.deleted_files);
        assert_eq!(backward.deleted_files, forward.added_files);
    }

    #[test]
    fn test_hash_difference_is_a_change() {
        let old = state(&[("a.py", "h1"), ("b.py", "h2")]);
        let new = state(&[("a.py", "h1"), ("b.py", "other")]);

        let changes = compare(&old, &new);
        assert!(changes.added_files.is_empty());
        assert!(changes.deleted_files.is_empty());
        assert_eq!(changes.changed_files, vec!["b.py"]);
    }

    #[test]
    fn test_file_md5_matches_content_not_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.txt");
        fs::write(&path, "same content").unwrap();
        let first = file_md5(&path).unwrap();

        // Rewrite with identical bytes
        fs::write(&path, "same content").unwrap();
        assert_eq!(file_md5(&path).unwrap(), first);

        fs::write(&path, "different").unwrap();
        assert_ne!(file_md5(&path).unwrap(), first);
    }

    #[test]
    fn test_monitor_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let tracked = dir.path().join("tracked.py");
        fs::write(&tracked, "v1").unwrap();

        let config = MonitorConfig {
            monitor_files: dir.path().join("monitor_files.json"),
            state_file: dir.path().join("state.json"),
            updated_files: dir.path().join("updated.json"),
        };
        let files = vec![tracked.to_string_lossy().into_owned()];
        crate::util::save_json(&config.monitor_files, &files).unwrap();

        let monitor = FileStateMonitor::new(&config);

        // First run: everything is new
        let changes = monitor.monitor().unwrap();
        assert_eq!(changes.added_files.len(), 1);

        // Second run with no edits: quiescent
        assert!(monitor.monitor().unwrap().is_empty());

        // Edit and re-run: classified as changed
        fs::write(&tracked, "v2").unwrap();
        let changes = monitor.monitor().unwrap();
        assert!(changes.added_files.is_empty());
        assert_eq!(changes.changed_files.len(), 1);
    }
}
