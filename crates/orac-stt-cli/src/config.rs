//! Service configuration: YAML file plus environment overrides.
//!
//! Precedence, lowest to highest: built-in defaults → config file →
//! environment (`MODEL_NAME`, `WHISPER_PROMPT`, `WHISPER_SERVER_HOST`,
//! `WHISPER_SERVER_PORT`, `USE_WHISPER_SERVER`) → CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use orac_stt_axum::ServerConfig;
use orac_stt_core::audio::PcmFormat;

/// On-disk configuration shape. Every field is optional; missing values
/// fall back to [`ServerConfig::with_defaults`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub recordings_dir: Option<PathBuf>,
    pub orac_core_url: Option<String>,
    pub stream_format: Option<PcmFormat>,
    pub stream_threshold_ms: Option<u64>,
    pub whisper: WhisperFileConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WhisperFileConfig {
    pub binary: Option<PathBuf>,
    pub models_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub model_name: Option<String>,
    pub prompt: Option<String>,
    pub health_check_interval_s: Option<u64>,
    pub max_consecutive_failures: Option<u32>,
    pub use_whisper_server: Option<bool>,
}

impl FileConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Resolve the effective server configuration from file values and
    /// engine-related environment variables.
    pub fn into_server_config(self, default_data_dir: PathBuf) -> ServerConfig {
        let data_dir = self.data_dir.unwrap_or(default_data_dir);
        let mut config = ServerConfig::with_defaults(data_dir);

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(recordings_dir) = self.recordings_dir {
            config.recordings_dir = recordings_dir;
        }
        if let Some(url) = self.orac_core_url {
            config.default_core_url = url;
        }
        if let Some(format) = self.stream_format {
            config.stream.format = format;
        }
        if let Some(threshold_ms) = self.stream_threshold_ms {
            config.stream.threshold_ms = threshold_ms;
        }

        let whisper = self.whisper;
        if let Some(binary) = whisper.binary {
            config.engine.binary = binary;
        }
        if let Some(models_dir) = whisper.models_dir {
            config.engine.models_dir = models_dir;
        }
        if let Some(host) = whisper.host {
            config.engine.host = host;
        }
        if let Some(port) = whisper.port {
            config.engine.port = port;
        }
        if let Some(model_name) = whisper.model_name {
            config.engine.model_name = model_name;
        }
        if let Some(prompt) = whisper.prompt {
            config.engine.prompt = prompt;
        }
        if let Some(secs) = whisper.health_check_interval_s {
            config.engine.health_check_interval = Duration::from_secs(secs);
        }
        if let Some(max) = whisper.max_consecutive_failures {
            config.engine.max_consecutive_failures = max;
        }
        if let Some(supervise) = whisper.use_whisper_server {
            config.engine.supervise = supervise;
        }

        apply_env_overrides(&mut config);
        config
    }
}

/// Environment variables the deployment scripts have always used.
fn apply_env_overrides(config: &mut ServerConfig) {
    if let Ok(model) = std::env::var("MODEL_NAME") {
        if !model.is_empty() {
            config.engine.model_name = model;
        }
    }
    if let Ok(prompt) = std::env::var("WHISPER_PROMPT") {
        if !prompt.is_empty() {
            config.engine.prompt = prompt;
        }
    }
    if let Ok(host) = std::env::var("WHISPER_SERVER_HOST") {
        if !host.is_empty() {
            config.engine.host = host;
        }
    }
    if let Ok(port) = std::env::var("WHISPER_SERVER_PORT") {
        if let Ok(port) = port.parse() {
            config.engine.port = port;
        }
    }
    if let Ok(use_server) = std::env::var("USE_WHISPER_SERVER") {
        config.engine.supervise = !matches!(
            use_server.to_ascii_lowercase().as_str(),
            "false" | "0" | "no"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file() {
        let config = FileConfig::load(None).unwrap();
        let server = config.into_server_config(PathBuf::from("/tmp/orac-data"));
        assert_eq!(server.port, 7272);
        assert_eq!(server.engine.model_name, "whisper-base");
        assert_eq!(server.data_dir, PathBuf::from("/tmp/orac-data"));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            concat!(
                "port: 9000\n",
                "orac_core_url: http://core-a:8000\n",
                "whisper:\n",
                "  model_name: whisper-small\n",
                "  port: 9090\n",
            ),
        )
        .unwrap();

        let config = FileConfig::load(Some(&path)).unwrap();
        let server = config.into_server_config(dir.path().to_path_buf());
        assert_eq!(server.port, 9000);
        assert_eq!(server.default_core_url, "http://core-a:8000");
        assert_eq!(server.engine.model_name, "whisper-small");
        assert_eq!(server.engine.port, 9090);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "port: [nope").unwrap();
        assert!(FileConfig::load(Some(&path)).is_err());
    }
}
