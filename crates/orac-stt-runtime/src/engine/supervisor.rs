//! whisper-server subprocess supervisor.
//!
//! Owns at most one engine child process and drives it through
//! `Stopped → Starting → Ready → Unhealthy → Restarting → Ready|Failed`.
//! All transitions that touch the child happen under one async mutex, which
//! also serializes the watchdog against admin-triggered restarts and model
//! swaps — the health loop simply skips a tick while a transition is in
//! flight.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::catalog;
use super::client::EngineClient;
use crate::process::{delete_pidfile, kill_stale_engine, terminate_child, write_pidfile};

/// Supervisor policy and engine launch parameters.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Path to the whisper-server binary.
    pub binary: PathBuf,
    /// Directory holding the ggml model files.
    pub models_dir: PathBuf,
    pub host: String,
    pub port: u16,
    /// Initial model name (see [`catalog::MODELS`]).
    pub model_name: String,
    /// Vocabulary-bias prompt passed to the engine.
    pub prompt: String,
    pub language: String,
    pub health_check_interval: Duration,
    /// Consecutive probe failures before a restart.
    pub max_consecutive_failures: u32,
    /// How long a freshly spawned engine gets to load its model.
    pub startup_timeout: Duration,
    pub pidfile: PathBuf,
    /// When false the engine is externally managed: no spawn, no restarts,
    /// health probes only.
    pub supervise: bool,
}

impl SupervisorConfig {
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Stopped,
    Starting,
    Ready,
    Unhealthy,
    Restarting,
    Failed,
}

/// Point-in-time supervisor status for the health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub server_url: String,
    pub model_name: String,
    pub restart_count: u32,
    pub consecutive_failures: u32,
    pub last_health_check: Option<DateTime<Utc>>,
    pub last_healthy: Option<DateTime<Utc>>,
    pub watchdog_running: bool,
}

/// Result of an explicit model swap.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSwap {
    pub model: String,
    /// Always true for the out-of-process engine: a swap is a restart.
    pub restart_required: bool,
    pub restart_count: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("engine binary not found: {0}")]
    BinaryMissing(PathBuf),

    #[error("model file not found: {0}")]
    ModelMissing(PathBuf),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("failed to spawn engine: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("engine did not become ready within {0:?}")]
    StartupTimeout(Duration),

    #[error("engine supervision is disabled (externally managed server)")]
    SupervisionDisabled,
}

struct StatusInner {
    state: EngineState,
    model_name: String,
    restart_count: u32,
    consecutive_failures: u32,
    last_health_check: Option<DateTime<Utc>>,
    last_healthy: Option<DateTime<Utc>>,
}

pub struct EngineSupervisor {
    config: SupervisorConfig,
    client: EngineClient,
    /// Owns the child; serializes start/stop/restart/swap and the watchdog.
    child: Mutex<Option<Child>>,
    status: StdMutex<StatusInner>,
    ever_ready: AtomicBool,
    watchdog_running: AtomicBool,
    cancel: CancellationToken,
}

impl EngineSupervisor {
    pub fn new(config: SupervisorConfig, client: EngineClient) -> Self {
        let status = StatusInner {
            state: EngineState::Stopped,
            model_name: config.model_name.clone(),
            restart_count: 0,
            consecutive_failures: 0,
            last_health_check: None,
            last_healthy: None,
        };
        info!(
            server_url = %config.server_url(),
            model = %config.model_name,
            supervise = config.supervise,
            "engine supervisor initialized"
        );
        Self {
            config,
            client,
            child: Mutex::new(None),
            status: StdMutex::new(status),
            ever_ready: AtomicBool::new(false),
            watchdog_running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    pub fn client(&self) -> &EngineClient {
        &self.client
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Start the engine (or, when supervision is disabled, gate on the
    /// external server's readiness).
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let mut child = self.child.lock().await;
        self.start_locked(&mut child).await
    }

    /// Stop the engine child, if any.
    pub async fn stop(&self) {
        let mut slot = self.child.lock().await;
        if let Some(child) = slot.take() {
            if let Err(e) = terminate_child(child).await {
                warn!(error = %e, "failed to terminate engine child");
            }
        }
        delete_pidfile(&self.config.pidfile);
        self.set_state(EngineState::Stopped);
    }

    /// Kill and respawn the engine. Increments the restart counter.
    pub async fn restart(&self) -> Result<(), SupervisorError> {
        let mut child = self.child.lock().await;
        self.restart_locked(&mut child).await
    }

    /// Swap to a different model by restarting the engine with new weights.
    ///
    /// The swap is the only code path allowed to replace the model; it runs
    /// under the child mutex so it cannot race the watchdog's restart.
    pub async fn swap_model(&self, model: &str) -> Result<ModelSwap, SupervisorError> {
        if !catalog::is_known_model(model) {
            return Err(SupervisorError::UnknownModel(model.to_string()));
        }
        if !self.config.supervise {
            return Err(SupervisorError::SupervisionDisabled);
        }

        let mut child = self.child.lock().await;
        let previous =
            std::mem::replace(&mut self.status.lock().unwrap().model_name, model.to_string());

        info!(from = %previous, to = %model, "model swap requested, restarting engine");
        if let Err(e) = self.restart_locked(&mut child).await {
            // Roll the name back so status reporting stays truthful.
            self.status.lock().unwrap().model_name = previous;
            return Err(e);
        }

        Ok(ModelSwap {
            model: model.to_string(),
            restart_required: true,
            restart_count: self.status.lock().unwrap().restart_count,
        })
    }

    /// Ensure the engine is ready, starting it if necessary. Returns the
    /// time spent waiting, for the preload endpoint.
    pub async fn ensure_ready(&self) -> Result<f64, SupervisorError> {
        let started = Instant::now();
        if self.client.health().await {
            self.mark_healthy();
            return Ok(started.elapsed().as_secs_f64());
        }
        self.start().await?;
        Ok(started.elapsed().as_secs_f64())
    }

    /// Launch the background health loop. Idempotent.
    pub fn spawn_watchdog(self: &std::sync::Arc<Self>) {
        if self.watchdog_running.swap(true, Ordering::SeqCst) {
            warn!("watchdog already running");
            return;
        }
        let supervisor = std::sync::Arc::clone(self);
        info!(
            interval_secs = self.config.health_check_interval.as_secs(),
            "engine watchdog started"
        );
        tokio::spawn(async move { supervisor.watchdog_loop().await });
    }

    /// Stop the watchdog and the engine child.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.watchdog_running.store(false, Ordering::SeqCst);
        self.stop().await;
    }

    /// Live probe against the engine, independent of supervisor state.
    pub async fn probe_health(&self) -> bool {
        self.client.health().await
    }

    /// Whether the engine reached Ready at least once this process lifetime.
    pub fn ever_ready(&self) -> bool {
        self.ever_ready.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> EngineStatus {
        let status = self.status.lock().unwrap();
        EngineStatus {
            state: status.state,
            server_url: self.config.server_url(),
            model_name: status.model_name.clone(),
            restart_count: status.restart_count,
            consecutive_failures: status.consecutive_failures,
            last_health_check: status.last_health_check,
            last_healthy: status.last_healthy,
            watchdog_running: self.watchdog_running.load(Ordering::SeqCst),
        }
    }

    pub fn max_consecutive_failures(&self) -> u32 {
        self.config.max_consecutive_failures
    }

    // ── internals ──────────────────────────────────────────────────────

    async fn start_locked(&self, slot: &mut Option<Child>) -> Result<(), SupervisorError> {
        if !self.config.supervise {
            // External engine: readiness gate only.
            self.set_state(EngineState::Starting);
            if self.client.wait_ready(self.config.startup_timeout).await {
                self.mark_healthy();
                Ok(())
            } else {
                self.set_state(EngineState::Unhealthy);
                Err(SupervisorError::StartupTimeout(self.config.startup_timeout))
            }
        } else {
            self.spawn_locked(slot).await
        }
    }

    async fn spawn_locked(&self, slot: &mut Option<Child>) -> Result<(), SupervisorError> {
        if !self.config.binary.exists() {
            return Err(SupervisorError::BinaryMissing(self.config.binary.clone()));
        }

        let model_name = self.status.lock().unwrap().model_name.clone();
        let model_file = catalog::model_file(&model_name)
            .ok_or_else(|| SupervisorError::UnknownModel(model_name.clone()))?;
        let model_path = self.config.models_dir.join(model_file);
        if !model_path.exists() {
            return Err(SupervisorError::ModelMissing(model_path));
        }

        self.set_state(EngineState::Starting);

        // Take over any engine left behind by a previous run of this service.
        if slot.is_none() {
            let binary_name = self
                .config
                .binary
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("whisper-server");
            kill_stale_engine(&self.config.pidfile, binary_name).await;
        }

        // Replace our own child if one is still tracked.
        if let Some(old) = slot.take() {
            let _ = terminate_child(old).await;
        }

        let mut command = Command::new(&self.config.binary);
        command
            .arg("--model")
            .arg(&model_path)
            .arg("--host")
            .arg(&self.config.host)
            .arg("--port")
            .arg(self.config.port.to_string())
            .arg("--language")
            .arg(&self.config.language)
            .arg("--prompt")
            .arg(&self.config.prompt)
            .arg("--no-timestamps")
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        info!(binary = %self.config.binary.display(), model = %model_path.display(), "starting engine");
        let mut child = command.spawn().map_err(SupervisorError::Spawn)?;

        if let Some(pid) = child.id() {
            if let Err(e) = write_pidfile(&self.config.pidfile, pid) {
                debug!(error = %e, "failed to write engine pidfile");
            }
            info!(pid, "engine spawned");
        }
        spawn_output_readers(&mut child);
        *slot = Some(child);

        if self.client.wait_ready(self.config.startup_timeout).await {
            self.mark_healthy();
            Ok(())
        } else {
            self.set_state(EngineState::Failed);
            Err(SupervisorError::StartupTimeout(self.config.startup_timeout))
        }
    }

    async fn restart_locked(&self, slot: &mut Option<Child>) -> Result<(), SupervisorError> {
        let restart_count = {
            let mut status = self.status.lock().unwrap();
            status.restart_count += 1;
            status.state = EngineState::Restarting;
            status.restart_count
        };
        info!(restart_count, "restarting engine");

        if let Some(child) = slot.take() {
            if let Err(e) = terminate_child(child).await {
                warn!(error = %e, "failed to terminate engine before restart");
            }
        }
        delete_pidfile(&self.config.pidfile);

        self.start_locked(slot).await
    }

    async fn watchdog_loop(self: std::sync::Arc<Self>) {
        let mut ticker = interval(self.config.health_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The immediate first tick would race the initial start.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("engine watchdog cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    // A held lock means start/restart/swap is in flight; the
                    // health loop stays out of the way.
                    let Ok(mut slot) = self.child.try_lock() else {
                        continue;
                    };
                    self.check_once(&mut slot).await;
                }
            }
        }
        self.watchdog_running.store(false, Ordering::SeqCst);
    }

    async fn check_once(&self, slot: &mut Option<Child>) {
        let healthy = self.client.health().await;
        let now = Utc::now();

        let failures = {
            let mut status = self.status.lock().unwrap();
            status.last_health_check = Some(now);
            if healthy {
                if status.consecutive_failures > 0 {
                    info!("engine recovered");
                }
                status.consecutive_failures = 0;
                status.last_healthy = Some(now);
                status.state = EngineState::Ready;
                0
            } else {
                status.consecutive_failures += 1;
                status.state = EngineState::Unhealthy;
                status.consecutive_failures
            }
        };

        if healthy {
            self.ever_ready.store(true, Ordering::SeqCst);
            return;
        }

        warn!(
            failures,
            threshold = self.config.max_consecutive_failures,
            "engine health probe failed"
        );
        if failures < self.config.max_consecutive_failures {
            return;
        }

        if !self.config.supervise {
            error!("externally managed engine is unresponsive, cannot restart it");
            return;
        }

        error!(failures, "engine unresponsive, restarting");
        if let Err(e) = self.restart_locked(slot).await {
            // A restart that cannot complete leaves no path back to Ready.
            // Exit non-zero so the container orchestrator replaces the pod.
            error!(error = %e, "engine restart failed, exiting for orchestrator restart");
            std::process::exit(1);
        }
        self.status.lock().unwrap().consecutive_failures = 0;
    }

    fn mark_healthy(&self) {
        let now = Utc::now();
        let mut status = self.status.lock().unwrap();
        status.state = EngineState::Ready;
        status.consecutive_failures = 0;
        status.last_health_check = Some(now);
        status.last_healthy = Some(now);
        drop(status);
        self.ever_ready.store(true, Ordering::SeqCst);
    }

    fn set_state(&self, state: EngineState) {
        self.status.lock().unwrap().state = state;
    }
}

/// Forward engine stdout/stderr lines into tracing.
fn spawn_output_readers(child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "orac_stt::engine", "{line}");
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "orac_stt::engine", "{line}");
            }
        });
    }
}
