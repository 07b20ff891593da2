//! Runtime-mutable settings with a YAML snapshot.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::persist::{self, StoreError};

const SETTINGS_FILE: &str = "settings.yaml";

fn default_core_timeout() -> u64 {
    30
}

/// Settings the admin API can change while the process runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Default downstream Core base URL, used for every topic without an
    /// override.
    pub orac_core_url: String,
    /// Core request timeout in seconds.
    #[serde(default = "default_core_timeout")]
    pub orac_core_timeout_s: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            orac_core_url: "http://127.0.0.1:8000".to_string(),
            orac_core_timeout_s: default_core_timeout(),
        }
    }
}

/// Process-scoped settings store.
///
/// Loaded once at startup (absent or corrupt file → defaults, never a crash)
/// and written back after every mutation. The mutex is released before the
/// disk write; writes are last-writer-wins.
pub struct SettingsStore {
    path: PathBuf,
    inner: Mutex<Settings>,
}

impl SettingsStore {
    /// Load settings from `<data_dir>/settings.yaml`, seeding the file with
    /// `defaults` when it does not exist yet.
    pub fn load(data_dir: &std::path::Path, defaults: Settings) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        let settings = persist::load_yaml::<Settings>(&path).unwrap_or_else(|| {
            if let Err(e) = persist::save_yaml(&path, &defaults) {
                tracing::error!(error = %e, "failed to seed settings file");
            }
            defaults
        });

        tracing::info!(core_url = %settings.orac_core_url, "settings loaded");
        Self {
            path,
            inner: Mutex::new(settings),
        }
    }

    /// Snapshot copy of the current settings.
    pub fn get(&self) -> Settings {
        self.inner.lock().unwrap().clone()
    }

    pub fn core_url(&self) -> String {
        self.inner.lock().unwrap().orac_core_url.clone()
    }

    pub fn core_timeout_s(&self) -> u64 {
        self.inner.lock().unwrap().orac_core_timeout_s
    }

    /// Replace the default Core URL (and optionally the timeout), persisting
    /// before returning. On a write failure the in-memory value is kept so
    /// the process continues to route correctly.
    pub fn set_core_url(
        &self,
        url: impl Into<String>,
        timeout_s: Option<u64>,
    ) -> Result<(), StoreError> {
        let snapshot = {
            let mut settings = self.inner.lock().unwrap();
            settings.orac_core_url = url.into();
            if let Some(timeout_s) = timeout_s {
                settings.orac_core_timeout_s = timeout_s;
            }
            settings.clone()
        };
        persist::save_yaml(&self.path, &snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_seeded_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(dir.path(), Settings::default());
        assert_eq!(store.core_timeout_s(), 30);
        assert!(dir.path().join("settings.yaml").exists());
    }

    #[test]
    fn mutation_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SettingsStore::load(dir.path(), Settings::default());
            store
                .set_core_url("http://core-b:8000", Some(10))
                .unwrap();
        }
        let store = SettingsStore::load(dir.path(), Settings::default());
        assert_eq!(store.core_url(), "http://core-b:8000");
        assert_eq!(store.core_timeout_s(), 10);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("settings.yaml"), ": not : valid : yaml :").unwrap();
        let store = SettingsStore::load(
            dir.path(),
            Settings {
                orac_core_url: "http://fallback:8000".into(),
                orac_core_timeout_s: 30,
            },
        );
        assert_eq!(store.core_url(), "http://fallback:8000");
    }
}
