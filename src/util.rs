// SPDX-License-Identifier: MIT

//! Shared file helpers: logged JSON I/O, string-set artifacts, text reads.
//!
//! Checkpoint-style JSON writes go through a sibling temp file and an atomic
//! rename, so a crash mid-write never leaves a truncated artifact behind.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PipelineError;

/// Load a JSON file into any deserializable value.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let content = fs::read_to_string(path).map_err(|e| PipelineError::persistence(path, e))?;
    let value = serde_json::from_str(&content)?;
    log::info!("json file loaded from: {}", path.display());
    Ok(value)
}

/// Write a value as pretty-printed JSON via temp file + rename.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let content = serde_json::to_string_pretty(value)?;
    let tmp = tmp_sibling(path);
    fs::write(&tmp, content).map_err(|e| PipelineError::persistence(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| PipelineError::persistence(path, e))?;
    log::info!("json file saved at: {}", path.display());
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Load a set of strings persisted as a JSON array.
pub fn load_set(path: &Path) -> Result<BTreeSet<String>, PipelineError> {
    let items: Vec<String> = load_json(path)?;
    Ok(items.into_iter().collect())
}

/// Persist a set of strings as a sorted JSON array.
pub fn save_set(path: &Path, items: &BTreeSet<String>) -> Result<(), PipelineError> {
    let items: Vec<&String> = items.iter().collect();
    save_json(path, &items)
}

/// Read a file as text, replacing invalid UTF-8 rather than failing.
/// Source trees routinely contain files in odd encodings.
pub fn read_text_lossy(path: &Path) -> Result<String, PipelineError> {
    let bytes = fs::read(path).map_err(|e| PipelineError::persistence(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// List all files under a directory, recursively, in sorted order.
pub fn list_files(path: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(path) {
        let entry = entry.map_err(|e| PipelineError::other(format!("walk {}: {e}", path.display())))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_save_and_load_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        save_json(&path, &json!({"a": 1, "b": ["x", "y"]})).unwrap();
        let loaded: serde_json::Value = load_json(&path).unwrap();

        assert_eq!(loaded["a"], 1);
        assert_eq!(loaded["b"][1], "y");
        // No temp file left behind
        assert!(!dir.path().join("data.json.tmp").exists());
    }

    #[test]
    fn test_save_json_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        save_json(&path, &json!({"version": 1})).unwrap();
        save_json(&path, &json!({"version": 2})).unwrap();

        let loaded: serde_json::Value = load_json(&path).unwrap();
        assert_eq!(loaded["version"], 2);
    }

    #[test]
    fn test_load_json_missing_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<serde_json::Value, _> = load_json(&dir.path().join("absent.json"));
        assert!(matches!(
            result,
            Err(PipelineError::Persistence { .. })
        ));
    }

    #[test]
    fn test_set_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("set.json");

        let mut set = BTreeSet::new();
        set.insert("b.py".to_string());
        set.insert("a.py".to_string());

        save_set(&path, &set).unwrap();
        let loaded = load_set(&path).unwrap();
        assert_eq!(loaded, set);
    }

    #[test]
    fn test_read_text_lossy_with_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weird.txt");
        fs::write(&path, b"ok \xff bytes").unwrap();

        let text = read_text_lossy(&path).unwrap();
        assert!(text.starts_with("ok "));
        assert!(text.ends_with(" bytes"));
    }

    #[test]
    fn test_list_files_recursive_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("sub/a.txt"), "a").unwrap();

        let files = list_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("b.txt"));
        assert!(files[1].ends_with("sub/a.txt"));
    }
}
