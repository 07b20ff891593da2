//! Downstream ORAC Core client.
//!
//! Forwarding is best-effort by contract: callers log failures and move on,
//! and nothing here retries. The [`CorePort`] trait is the seam the
//! aggregator and pipeline are tested through.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use orac_stt_core::heartbeat::{CoreHeartbeatRequest, FORWARD_SOURCE};
use orac_stt_core::topics::sanitize_topic;
use orac_stt_core::SettingsStore;

/// Errors from a Core delivery attempt. Callers swallow these after logging;
/// the variants exist for metrics labels and tests.
#[derive(Debug, thiserror::Error)]
pub enum CoreForwardError {
    #[error("request to Core failed: {0}")]
    Transport(String),

    #[error("Core returned HTTP {0}")]
    Http(u16),
}

/// Client-side view of one Core endpoint.
#[async_trait]
pub trait CorePort: Send + Sync {
    /// POST `/v1/generate/{topic}` with the transcription as prompt.
    async fn forward_transcription(
        &self,
        text: &str,
        topic: &str,
        metadata: serde_json::Value,
    ) -> Result<(), CoreForwardError>;

    /// POST `/v1/topics/heartbeat` with a batched heartbeat.
    async fn forward_heartbeat(&self, batch: &CoreHeartbeatRequest)
        -> Result<(), CoreForwardError>;

    /// GET `/v1/status`; healthy means 200 with `status == "running"`.
    async fn health(&self) -> bool;

    fn base_url(&self) -> &str;
}

/// Resolves the Core endpoint for a forward: `None` means the process-wide
/// default, `Some(url)` a per-topic override.
pub trait CoreResolver: Send + Sync {
    fn resolve(&self, override_url: Option<&str>) -> Arc<dyn CorePort>;
}

/// reqwest-backed [`CorePort`].
pub struct HttpCoreClient {
    base_url: String,
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpCoreClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            timeout,
        }
    }

    fn classify(e: &reqwest::Error) -> CoreForwardError {
        CoreForwardError::Transport(e.to_string())
    }
}

#[async_trait]
impl CorePort for HttpCoreClient {
    async fn forward_transcription(
        &self,
        text: &str,
        topic: &str,
        metadata: serde_json::Value,
    ) -> Result<(), CoreForwardError> {
        let topic = sanitize_topic(topic);
        let url = format!("{}/v1/generate/{topic}", self.base_url);

        // Stamp provenance onto whatever metadata the pipeline assembled.
        let mut metadata = match metadata {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("context".to_string(), other);
                map
            }
        };
        metadata.insert("source".to_string(), json!(FORWARD_SOURCE));
        metadata.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));

        let payload = json!({
            "prompt": text,
            "stream": false,
            "metadata": metadata,
        });

        info!(topic, text_len = text.len(), "forwarding transcription to Core");
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Self::classify(&e))?;

        let status = response.status();
        if status.as_u16() == 404 {
            // Core auto-discovers topics; a 404 here just means it has not
            // seen this one yet.
            warn!(topic, "topic not known to Core yet");
            return Err(CoreForwardError::Http(404));
        }
        if !status.is_success() {
            return Err(CoreForwardError::Http(status.as_u16()));
        }
        Ok(())
    }

    async fn forward_heartbeat(
        &self,
        batch: &CoreHeartbeatRequest,
    ) -> Result<(), CoreForwardError> {
        let url = format!("{}/v1/topics/heartbeat", self.base_url);
        info!(topics = batch.topics.len(), core = %self.base_url, "forwarding heartbeat batch");

        let response = self
            .http
            .post(&url)
            .json(batch)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Self::classify(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreForwardError::Http(status.as_u16()));
        }
        Ok(())
    }

    async fn health(&self) -> bool {
        let url = format!("{}/v1/status", self.base_url);
        let response = match self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "Core health probe failed");
                return false;
            }
        };
        if !response.status().is_success() {
            return false;
        }
        match response.json::<serde_json::Value>().await {
            Ok(body) => body.get("status").and_then(|s| s.as_str()) == Some("running"),
            Err(_) => false,
        }
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Process-scoped client factory.
///
/// The default client is cached and keyed on the currently configured default
/// URL + timeout, so an admin settings change takes effect on the next
/// forward. Override clients are pooled per URL.
pub struct CoreRouter {
    settings: Arc<SettingsStore>,
    default: Mutex<Option<(String, u64, Arc<HttpCoreClient>)>>,
    overrides: Mutex<HashMap<String, Arc<HttpCoreClient>>>,
}

impl CoreRouter {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self {
            settings,
            default: Mutex::new(None),
            overrides: Mutex::new(HashMap::new()),
        }
    }

    /// The client for the currently configured default Core URL.
    pub fn default_client(&self) -> Arc<HttpCoreClient> {
        let url = self.settings.core_url();
        let timeout_s = self.settings.core_timeout_s();

        let mut cached = self.default.lock().unwrap();
        if let Some((cached_url, cached_timeout, client)) = cached.as_ref() {
            if *cached_url == url && *cached_timeout == timeout_s {
                return Arc::clone(client);
            }
        }

        info!(core_url = %url, "building Core client for default endpoint");
        let client = Arc::new(HttpCoreClient::new(&url, Duration::from_secs(timeout_s)));
        *cached = Some((url, timeout_s, Arc::clone(&client)));
        client
    }

    /// A client for a per-topic override URL.
    pub fn client_for(&self, url: &str) -> Arc<HttpCoreClient> {
        let mut overrides = self.overrides.lock().unwrap();
        if let Some(client) = overrides.get(url) {
            return Arc::clone(client);
        }
        let timeout = Duration::from_secs(self.settings.core_timeout_s());
        let client = Arc::new(HttpCoreClient::new(url, timeout));
        overrides.insert(url.to_string(), Arc::clone(&client));
        client
    }
}

impl CoreResolver for CoreRouter {
    fn resolve(&self, override_url: Option<&str>) -> Arc<dyn CorePort> {
        match override_url {
            Some(url) => self.client_for(url),
            None => self.default_client(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orac_stt_core::Settings;

    fn router() -> (tempfile::TempDir, CoreRouter) {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(SettingsStore::load(
            dir.path(),
            Settings {
                orac_core_url: "http://core-a:8000".into(),
                orac_core_timeout_s: 30,
            },
        ));
        (dir, CoreRouter::new(settings))
    }

    #[test]
    fn default_client_follows_settings_changes() {
        let (_dir, router) = router();
        assert_eq!(router.default_client().base_url(), "http://core-a:8000");

        router
            .settings
            .set_core_url("http://core-b:8000", None)
            .unwrap();
        assert_eq!(router.default_client().base_url(), "http://core-b:8000");
    }

    #[test]
    fn override_clients_are_pooled() {
        let (_dir, router) = router();
        let first = router.client_for("http://core-x:8000");
        let second = router.client_for("http://core-x:8000");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn resolver_picks_override_when_present() {
        let (_dir, router) = router();
        assert_eq!(
            router.resolve(Some("http://core-x:8000")).base_url(),
            "http://core-x:8000"
        );
        assert_eq!(router.resolve(None).base_url(), "http://core-a:8000");
    }

    #[tokio::test]
    async fn unreachable_core_fails_health() {
        let client = HttpCoreClient::new("http://127.0.0.1:59997", Duration::from_secs(1));
        assert!(!client.health().await);
    }

    #[tokio::test]
    async fn unreachable_core_yields_transport_error() {
        let client = HttpCoreClient::new("http://127.0.0.1:59997", Duration::from_secs(1));
        let err = client
            .forward_transcription("lights on", "jarvis", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreForwardError::Transport(_)));
    }
}
