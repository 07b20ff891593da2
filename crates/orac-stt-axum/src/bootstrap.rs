//! Composition root for the web server.
//!
//! This module is the ONLY place where process-scoped state is constructed:
//! settings, registry, history ring, snapshot store, engine supervisor,
//! heartbeat aggregator and the transcription pipeline are all built here
//! and injected into handlers through [`AppState`] — no lazy globals.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

use orac_stt_core::audio::PcmFormat;
use orac_stt_core::{CommandBuffer, Settings, SettingsStore, TopicRegistry};
use orac_stt_runtime::{
    AggregatorConfig, CoreResolver, CoreRouter, EngineClient, EngineSupervisor,
    HeartbeatAggregator, SnapshotStore, SupervisorConfig, TranscribePipeline, INFERENCE_TIMEOUT,
};

use crate::metrics::SttMetrics;
use crate::state::AppState;

const STALE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const MODEL_EVENT_QUEUE: usize = 16;

/// Streaming endpoint knobs.
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// How binary frames are decoded.
    pub format: PcmFormat,
    /// Minimum buffered audio before `end` may trigger a transcription.
    pub threshold_ms: u64,
}

/// Server configuration assembled by the CLI.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory for `topics.yaml`, `settings.yaml` and the engine pidfile.
    pub data_dir: PathBuf,
    /// Directory for the snapshot WAV ring.
    pub recordings_dir: PathBuf,
    pub command_capacity: usize,
    pub snapshot_capacity: usize,
    /// Seed value for `orac_core_url` when no settings file exists yet.
    pub default_core_url: String,
    pub stream: StreamSettings,
    pub engine: SupervisorConfig,
    /// Start (or gate on) the engine during bootstrap. Tests disable this.
    pub start_engine: bool,
}

impl ServerConfig {
    /// Defaults matching the container layout.
    pub fn with_defaults(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            host: "0.0.0.0".to_string(),
            port: 7272,
            recordings_dir: data_dir.join("debug_recordings"),
            command_capacity: 5,
            snapshot_capacity: 5,
            default_core_url: "http://127.0.0.1:8000".to_string(),
            stream: StreamSettings {
                format: PcmFormat::Int16,
                threshold_ms: 300,
            },
            engine: SupervisorConfig {
                binary: PathBuf::from("/app/third_party/whisper_cpp/bin/whisper-server"),
                models_dir: PathBuf::from("/app/models/whisper_cpp/whisper"),
                host: "127.0.0.1".to_string(),
                port: 8080,
                model_name: "whisper-base".to_string(),
                prompt: "lounge cabinet lights kitchen bedroom bathroom office".to_string(),
                language: "en".to_string(),
                health_check_interval: Duration::from_secs(60),
                max_consecutive_failures: 2,
                startup_timeout: Duration::from_secs(60),
                pidfile: data_dir.join("engine.pid"),
                supervise: true,
            },
            start_engine: true,
            data_dir,
        }
    }
}

/// Everything handlers can reach.
pub struct AppContext {
    pub settings: Arc<SettingsStore>,
    pub registry: Arc<TopicRegistry>,
    pub history: Arc<CommandBuffer>,
    pub snapshots: Arc<SnapshotStore>,
    pub supervisor: Arc<EngineSupervisor>,
    pub aggregator: Arc<HeartbeatAggregator>,
    pub pipeline: Arc<TranscribePipeline>,
    pub core: Arc<CoreRouter>,
    pub metrics: Arc<SttMetrics>,
    /// Fires the model name after a successful swap (admin live channel).
    pub model_events: broadcast::Sender<String>,
    pub stream: StreamSettings,
}

impl AppContext {
    /// Stop background loops and the engine child.
    pub async fn shutdown(&self) {
        self.aggregator.shutdown();
        self.supervisor.shutdown().await;
    }
}

/// Build all process-scoped state.
///
/// With `start_engine` set this also runs the engine through its readiness
/// gate and launches the watchdog; a supervised engine that cannot start is
/// fatal so the orchestrator can restart the whole pod.
pub async fn bootstrap(config: ServerConfig) -> Result<AppState> {
    std::fs::create_dir_all(&config.data_dir)?;

    info!(
        data_dir = %config.data_dir.display(),
        recordings_dir = %config.recordings_dir.display(),
        engine_url = %config.engine.server_url(),
        "bootstrapping ORAC STT"
    );

    let settings = Arc::new(SettingsStore::load(
        &config.data_dir,
        Settings {
            orac_core_url: config.default_core_url.clone(),
            ..Settings::default()
        },
    ));
    let registry = Arc::new(TopicRegistry::open(&config.data_dir));
    let history = Arc::new(CommandBuffer::new(config.command_capacity));
    let snapshots = Arc::new(SnapshotStore::open(
        config.recordings_dir.clone(),
        config.snapshot_capacity,
    ));

    let engine_client = EngineClient::new(
        &config.engine.server_url(),
        INFERENCE_TIMEOUT,
        Some(config.engine.language.clone()),
    );
    let supervisor = Arc::new(EngineSupervisor::new(
        config.engine.clone(),
        engine_client.clone(),
    ));

    let core = Arc::new(CoreRouter::new(Arc::clone(&settings)));
    let resolver: Arc<dyn CoreResolver> = Arc::clone(&core) as Arc<dyn CoreResolver>;

    let pipeline = Arc::new(TranscribePipeline::new(
        Arc::new(engine_client),
        Arc::clone(&history),
        Arc::clone(&registry),
        Arc::clone(&resolver),
        Arc::clone(&snapshots),
    ));

    let aggregator = Arc::new(HeartbeatAggregator::new(
        AggregatorConfig::default(),
        Arc::clone(&registry),
        resolver,
    ));
    aggregator.spawn_sweeper(STALE_SWEEP_INTERVAL);

    if config.start_engine {
        match supervisor.start().await {
            Ok(()) => {}
            Err(e) if config.engine.supervise => {
                // No engine, no service: bubble up so the process exits
                // non-zero.
                return Err(e.into());
            }
            Err(e) => {
                warn!(error = %e, "external engine not ready yet, continuing");
            }
        }
        supervisor.spawn_watchdog();
    }

    let (model_events, _) = broadcast::channel(MODEL_EVENT_QUEUE);

    Ok(Arc::new(AppContext {
        settings,
        registry,
        history,
        snapshots,
        supervisor,
        aggregator,
        pipeline,
        core,
        metrics: Arc::new(SttMetrics::new()?),
        model_events,
        stream: config.stream,
    }))
}

/// Bootstrap, bind and serve until SIGINT/SIGTERM.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = bootstrap(config).await?;
    let app = crate::routes::create_router(Arc::clone(&state));

    let listener = TcpListener::bind(&addr).await?;
    info!("ORAC STT listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    state.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
