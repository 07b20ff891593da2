//! YAML snapshot persistence.
//!
//! Snapshots are written to a temp file in the target directory and renamed
//! into place so a crash mid-write never leaves a truncated file. Loads are
//! best-effort: a missing or unparseable file yields `None` and the caller
//! starts empty.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors from snapshot persistence. In-memory state is always retained on
/// failure; the next successful write reconciles the file.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to serialize snapshot for {path}: {message}")]
    Serialize { path: PathBuf, message: String },

    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Serialize `value` as YAML and atomically replace `path` with it.
pub fn save_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let contents = serde_yaml::to_string(value).map_err(|e| StoreError::Serialize {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let tmp = path.with_extension("tmp");
    let write = |p: &Path, c: &str| {
        fs::write(p, c).map_err(|source| StoreError::Write {
            path: p.to_path_buf(),
            source,
        })
    };

    write(&tmp, &contents)?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = %path.display(), "snapshot saved");
    Ok(())
}

/// Load a YAML snapshot, tolerating absence and parse errors.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no snapshot file, starting fresh");
        return None;
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read snapshot");
            return None;
        }
    };

    match serde_yaml::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to parse snapshot, starting fresh");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.yaml");
        let value = Sample {
            name: "jarvis".into(),
            count: 3,
        };

        save_yaml(&path, &value).unwrap();
        let loaded: Sample = load_yaml(&path).unwrap();
        assert_eq!(loaded, value);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<Sample> = load_yaml(&dir.path().join("absent.yaml"));
        assert!(loaded.is_none());
    }

    #[test]
    fn corrupt_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.yaml");
        fs::write(&path, "{not yaml: [").unwrap();
        let loaded: Option<Sample> = load_yaml(&path);
        assert!(loaded.is_none());
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.yaml");
        save_yaml(&path, &Sample { name: "a".into(), count: 1 }).unwrap();
        save_yaml(&path, &Sample { name: "b".into(), count: 2 }).unwrap();
        let loaded: Sample = load_yaml(&path).unwrap();
        assert_eq!(loaded.name, "b");
    }
}
