//! Bounded on-disk ring of recent utterance WAVs.
//!
//! Every transcription attempt snapshots its prepared audio to
//! `debug_recordings/` so the last few utterances can be replayed when
//! debugging wake-word or accuracy issues. Eviction here is independent of
//! the command history ring — a Command may outlive its snapshot file.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use orac_stt_core::audio::{self, SAMPLE_RATE};

const FILE_PREFIX: &str = "debug_";

/// Listing entry for the debug recordings API.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub created: DateTime<Utc>,
    /// Estimated from file size at 16 kHz 16-bit mono.
    pub duration_estimate: f64,
}

/// Bounded FIFO of snapshot WAV files.
pub struct SnapshotStore {
    dir: PathBuf,
    max_files: usize,
}

impl SnapshotStore {
    pub fn open(dir: impl Into<PathBuf>, max_files: usize) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            error!(dir = %dir.display(), error = %e, "failed to create snapshot directory");
        }
        Self {
            dir,
            max_files: max_files.max(1),
        }
    }

    /// Write a snapshot named after the timestamp and a slug of the
    /// transcription, then prune the ring. Failures are logged, never fatal.
    pub fn save(&self, samples: &[f32], label: &str) -> Option<PathBuf> {
        let wav = match audio::encode_wav(samples, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                error!(error = %e, "failed to encode snapshot WAV");
                return None;
            }
        };

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let filename = format!("{FILE_PREFIX}{timestamp}_{}.wav", slug(label));
        let path = self.dir.join(&filename);

        if let Err(e) = fs::write(&path, wav) {
            error!(path = %path.display(), error = %e, "failed to write snapshot");
            return None;
        }
        info!(
            file = %filename,
            seconds = samples.len() as f64 / f64::from(SAMPLE_RATE),
            "snapshot saved"
        );

        self.prune();
        Some(path)
    }

    /// List snapshots, newest first.
    pub fn list(&self) -> Vec<SnapshotInfo> {
        let mut files = self.sorted_files();
        files.reverse();
        files
            .into_iter()
            .filter_map(|path| {
                let meta = fs::metadata(&path).ok()?;
                let created = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                Some(SnapshotInfo {
                    filename: path.file_name()?.to_str()?.to_string(),
                    size_bytes: meta.len(),
                    created,
                    duration_estimate: meta.len() as f64 / (f64::from(SAMPLE_RATE) * 2.0),
                })
            })
            .collect()
    }

    /// Resolve a snapshot filename to its path, refusing anything that is
    /// not a plain `debug_*.wav` name inside the ring directory.
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        if !filename.starts_with(FILE_PREFIX)
            || !filename.ends_with(".wav")
            || filename.contains(['/', '\\'])
            || filename.contains("..")
        {
            return None;
        }
        let path = self.dir.join(filename);
        path.exists().then_some(path)
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    fn prune(&self) {
        let files = self.sorted_files();
        if files.len() <= self.max_files {
            return;
        }
        for old in &files[..files.len() - self.max_files] {
            match fs::remove_file(old) {
                Ok(()) => debug!(file = %old.display(), "evicted old snapshot"),
                Err(e) => debug!(file = %old.display(), error = %e, "failed to evict snapshot"),
            }
        }
    }

    /// Snapshot files sorted oldest-first. The timestamped names sort
    /// lexicographically in creation order.
    fn sorted_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(".wav"))
            })
            .collect();
        files.sort();
        files
    }
}

/// First 30 chars of the transcription with separators flattened, for the
/// filename.
fn slug(label: &str) -> String {
    let trimmed: String = label.chars().take(30).collect();
    let slug: String = trimmed
        .chars()
        .map(|c| if c == ' ' || c == '/' || c == '\\' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '[' || *c == ']')
        .collect();
    if slug.is_empty() {
        "empty".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<f32> {
        vec![0.1f32; 1600]
    }

    #[test]
    fn save_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), 5);
        let path = store.save(&samples(), "turn on the lights").unwrap();
        assert!(path.exists());

        let listed = store.list();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].filename.starts_with("debug_"));
        assert!(listed[0].filename.contains("turn_on_the_lights"));
        // 1600 samples of 16-bit audio ≈ 0.1 s, plus WAV header slack.
        assert!((listed[0].duration_estimate - 0.1).abs() < 0.05);
    }

    #[test]
    fn ring_keeps_only_newest_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), 3);
        for i in 0..6 {
            store.save(&samples(), &format!("utterance {i}")).unwrap();
            // Distinct millisecond timestamps keep the sort stable.
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let listed = store.list();
        assert_eq!(listed.len(), 3);
        assert!(listed[0].filename.contains("utterance_5"));
        assert!(listed[2].filename.contains("utterance_3"));
    }

    #[test]
    fn resolve_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), 5);
        store.save(&samples(), "hello").unwrap();

        assert!(store.resolve("../etc/passwd").is_none());
        assert!(store.resolve("debug_../../x.wav").is_none());
        assert!(store.resolve("not_a_snapshot.wav").is_none());
        assert!(store.resolve("debug_missing.wav").is_none());

        let listed = store.list();
        assert!(store.resolve(&listed[0].filename).is_some());
    }

    #[test]
    fn empty_label_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), 5);
        let path = store.save(&samples(), "").unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().contains("empty"));
    }
}
