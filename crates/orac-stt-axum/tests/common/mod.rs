//! Shared fixtures: bootstrapped app state, fake engine, fake Core.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use orac_stt_axum::{bootstrap, AppState, ServerConfig};

/// Bootstrap app state against a temp dir, without starting any engine.
/// `engine_addr` is where the pipeline's engine client will point.
pub async fn test_state(dir: &Path, engine_addr: Option<SocketAddr>, core_url: &str) -> AppState {
    let mut config = ServerConfig::with_defaults(dir.join("data"));
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.recordings_dir = dir.join("debug_recordings");
    config.default_core_url = core_url.to_string();
    config.start_engine = false;
    config.engine.supervise = false;
    config.engine.startup_timeout = Duration::from_millis(200);
    match engine_addr {
        Some(addr) => {
            config.engine.host = addr.ip().to_string();
            config.engine.port = addr.port();
        }
        None => {
            // A port nothing listens on: engine calls fail fast.
            config.engine.host = "127.0.0.1".to_string();
            config.engine.port = 59900;
        }
    }
    bootstrap(config).await.expect("bootstrap failed")
}

/// Serve a router on an ephemeral port, returning its address.
pub async fn spawn_server(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Fake whisper engine: 200 on `/`, fixed transcription on `/inference`.
pub async fn fake_engine(text: &str) -> SocketAddr {
    let text = text.to_string();
    let app = Router::new()
        .route("/", get(|| async { "whisper-server" }))
        .route(
            "/inference",
            post(move |_body: axum::body::Bytes| {
                let text = text.clone();
                async move { Json(json!({"text": text, "language": "en"})) }
            }),
        );
    spawn_server(app).await
}

/// Everything the fake Core received, keyed by request path.
pub type CoreLog = Arc<Mutex<Vec<(String, Value)>>>;

/// Fake downstream Core recording every POST body.
pub async fn fake_core() -> (SocketAddr, CoreLog) {
    let log: CoreLog = Arc::default();

    async fn record(
        State(log): State<CoreLog>,
        request: axum::extract::Request,
    ) -> Json<Value> {
        let path = request.uri().path().to_string();
        let body = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        let value: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        log.lock().unwrap().push((path, value));
        Json(json!({"status": "ok"}))
    }

    let app = Router::new()
        .route("/v1/status", get(|| async { Json(json!({"status": "running"})) }))
        .route("/v1/generate/{topic}", post(record))
        .route("/v1/topics/heartbeat", post(record))
        .with_state(Arc::clone(&log));

    (spawn_server(app).await, log)
}

/// A valid mono 16 kHz WAV of roughly `seconds` seconds.
pub fn wav_fixture(seconds: f64) -> Vec<u8> {
    let n = (16_000.0 * seconds) as usize;
    let samples: Vec<f32> = (0..n)
        .map(|i| (i as f32 * 0.01).sin() * 0.3)
        .collect();
    orac_stt_core::audio::encode_wav(&samples, 16_000).unwrap()
}

/// Build a multipart/form-data body with one `file` part.
pub fn multipart_body(file_bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = "orac-stt-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"audio.wav\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: audio/wav\r\n\r\n");
    body.extend_from_slice(file_bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

/// Await until `predicate` returns true or the timeout hits. The Core
/// forward is fire-and-forget, so tests poll rather than sleep blindly.
pub async fn wait_for(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
    let started = std::time::Instant::now();
    while started.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    predicate()
}
