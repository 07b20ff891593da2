//! Topic registry with lazy registration and YAML persistence.
//!
//! Topics are never created up front: the first heartbeat or admin call that
//! names a topic registers it. A topic deactivates when heartbeats stop but
//! is only removed by an explicit delete.

mod strip;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persist::{self, StoreError};

pub use strip::{is_valid_topic, sanitize_topic, strip_wake_words, DEFAULT_TOPIC};

const TOPICS_FILE: &str = "topics.yaml";

/// A topic counts as active while heartbeats arrived within this window.
pub const ACTIVE_WINDOW: Duration = Duration::from_secs(120);

/// Opaque per-topic metadata (wake word, trigger count, status, ...).
pub type TopicMetadata = BTreeMap<String, serde_json::Value>;

/// Configuration and liveness state for one topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Topic identifier from the wake word. `[A-Za-z0-9_]+` is enforced on
    /// the forward path, not here — heartbeats may name anything.
    pub name: String,
    /// Core URL override; `None` routes to the process-wide default.
    #[serde(default)]
    pub orac_core_url: Option<String>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: TopicMetadata,
    /// Comma-separated phrases stripped from the head of forwarded
    /// transcriptions, matched case-insensitively.
    #[serde(default)]
    pub wake_words_to_strip: Option<String>,
}

impl TopicConfig {
    fn new(name: impl Into<String>, metadata: Option<TopicMetadata>) -> Self {
        Self {
            name: name.into(),
            orac_core_url: None,
            last_seen: Some(Utc::now()),
            metadata: metadata.unwrap_or_default(),
            wake_words_to_strip: None,
        }
    }

    /// Heartbeat seen within [`ACTIVE_WINDOW`].
    pub fn is_active(&self) -> bool {
        self.last_seen.is_some_and(|seen| {
            Utc::now().signed_duration_since(seen).num_seconds()
                < ACTIVE_WINDOW.as_secs() as i64
        })
    }

    /// Bump `last_seen` and merge (never drop) metadata.
    fn update_activity(&mut self, metadata: Option<&TopicMetadata>) {
        self.last_seen = Some(Utc::now());
        if let Some(metadata) = metadata {
            for (key, value) in metadata {
                self.metadata.insert(key.clone(), value.clone());
            }
        }
    }
}

/// On-disk snapshot shape, matching `data/topics.yaml`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TopicsSnapshot {
    #[serde(default)]
    topics: Vec<TopicConfig>,
}

/// Process-scoped topic registry.
///
/// All mutation goes through this type; every mutating call serializes the
/// map under the lock and writes the snapshot after releasing it. Topic names
/// compare case-sensitively.
pub struct TopicRegistry {
    path: PathBuf,
    topics: Mutex<BTreeMap<String, TopicConfig>>,
}

impl TopicRegistry {
    /// Open the registry backed by `<data_dir>/topics.yaml` (best-effort
    /// load; a corrupt file starts empty).
    pub fn open(data_dir: &std::path::Path) -> Self {
        let path = data_dir.join(TOPICS_FILE);
        let topics = persist::load_yaml::<TopicsSnapshot>(&path)
            .map(|snapshot| {
                snapshot
                    .topics
                    .into_iter()
                    .map(|t| (t.name.clone(), t))
                    .collect()
            })
            .unwrap_or_default();

        let registry = Self {
            path,
            topics: Mutex::new(topics),
        };
        tracing::info!(count = registry.len(), "topic registry loaded");
        registry
    }

    /// Create-if-absent; refreshes `last_seen` and merges metadata either
    /// way. Persist failures are logged and swallowed — this sits on the
    /// heartbeat hot path.
    pub fn auto_register(&self, name: &str, metadata: Option<TopicMetadata>) -> TopicConfig {
        let (topic, snapshot) = {
            let mut topics = self.topics.lock().unwrap();
            let topic = match topics.get_mut(name) {
                Some(existing) => {
                    existing.update_activity(metadata.as_ref());
                    existing.clone()
                }
                None => {
                    tracing::info!(topic = name, "auto-registering new topic");
                    let topic = TopicConfig::new(name, metadata);
                    topics.insert(name.to_string(), topic.clone());
                    topic
                }
            };
            (topic, self.snapshot_locked(&topics))
        };

        if let Err(e) = persist::save_yaml(&self.path, &snapshot) {
            tracing::error!(error = %e, "failed to persist topic registry");
        }
        topic
    }

    /// Same as [`auto_register`](Self::auto_register), kept as a separate
    /// name for call sites that only mean "this topic was seen".
    pub fn update_activity(&self, name: &str, metadata: Option<TopicMetadata>) {
        let _ = self.auto_register(name, metadata);
    }

    pub fn get(&self, name: &str) -> Option<TopicConfig> {
        self.topics.lock().unwrap().get(name).cloned()
    }

    /// Per-topic Core URL override, `None` meaning "use default".
    pub fn core_url(&self, name: &str) -> Option<String> {
        self.topics
            .lock()
            .unwrap()
            .get(name)
            .and_then(|t| t.orac_core_url.clone())
    }

    /// The topic's strip list, if configured.
    pub fn wake_words_to_strip(&self, name: &str) -> Option<String> {
        self.topics
            .lock()
            .unwrap()
            .get(name)
            .and_then(|t| t.wake_words_to_strip.clone())
    }

    /// Set or clear the Core URL override. Auto-registers an unknown topic.
    /// Admin path: persistence failure is reported to the caller.
    pub fn set_core_url(&self, name: &str, url: Option<String>) -> Result<(), StoreError> {
        self.mutate(name, |topic| topic.orac_core_url = url)
    }

    /// Set or clear the wake-word strip list. Auto-registers an unknown topic.
    pub fn set_wake_words_to_strip(
        &self,
        name: &str,
        wake_words: Option<String>,
    ) -> Result<(), StoreError> {
        self.mutate(name, |topic| topic.wake_words_to_strip = wake_words)
    }

    fn mutate(
        &self,
        name: &str,
        apply: impl FnOnce(&mut TopicConfig),
    ) -> Result<(), StoreError> {
        let snapshot = {
            let mut topics = self.topics.lock().unwrap();
            let topic = topics
                .entry(name.to_string())
                .or_insert_with(|| TopicConfig::new(name, None));
            apply(topic);
            self.snapshot_locked(&topics)
        };
        persist::save_yaml(&self.path, &snapshot)
    }

    pub fn get_all(&self) -> Vec<TopicConfig> {
        self.topics.lock().unwrap().values().cloned().collect()
    }

    pub fn get_active(&self) -> Vec<TopicConfig> {
        self.topics
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.is_active())
            .cloned()
            .collect()
    }

    /// Remove a topic entirely. Returns whether it existed.
    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        let (removed, snapshot) = {
            let mut topics = self.topics.lock().unwrap();
            let removed = topics.remove(name).is_some();
            (removed, self.snapshot_locked(&topics))
        };
        if removed {
            persist::save_yaml(&self.path, &snapshot)?;
        }
        Ok(removed)
    }

    /// Partition topic names by their effective Core URL. The `None` key
    /// collects topics routed to the process-wide default.
    pub fn group_by_core_url(&self, names: &[String]) -> HashMap<Option<String>, Vec<String>> {
        let topics = self.topics.lock().unwrap();
        let mut grouped: HashMap<Option<String>, Vec<String>> = HashMap::new();
        for name in names {
            let url = topics.get(name).and_then(|t| t.orac_core_url.clone());
            grouped.entry(url).or_default().push(name.clone());
        }
        grouped
    }

    pub fn len(&self) -> usize {
        self.topics.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot_locked(&self, topics: &BTreeMap<String, TopicConfig>) -> TopicsSnapshot {
        TopicsSnapshot {
            topics: topics.values().cloned().collect(),
        }
    }
}
