//! Prometheus metrics: request middleware, pipeline histograms, exposition.

use axum::extract::{MatchedPath, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::state::AppState;

/// Metric handles registered against a dedicated registry, so nothing else
/// linked into the process can collide with them.
pub struct SttMetrics {
    registry: Registry,
    pub requests_total: IntCounterVec,
    pub request_duration: HistogramVec,
    pub active_requests: IntGauge,
    pub inference_duration: HistogramVec,
    pub audio_duration: Histogram,
    pub errors_total: IntCounterVec,
}

impl SttMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("orac_stt_requests_total", "Total number of STT requests"),
            &["method", "endpoint", "status"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "orac_stt_request_duration_seconds",
                "Request duration in seconds",
            ),
            &["method", "endpoint"],
        )?;
        let active_requests = IntGauge::new(
            "orac_stt_active_requests",
            "Number of requests currently in flight",
        )?;
        let inference_duration = HistogramVec::new(
            HistogramOpts::new(
                "orac_stt_inference_duration_seconds",
                "Engine inference duration in seconds",
            ),
            &["model"],
        )?;
        let audio_duration = Histogram::with_opts(HistogramOpts::new(
            "orac_stt_audio_duration_seconds",
            "Duration of processed audio in seconds",
        ))?;
        let errors_total = IntCounterVec::new(
            Opts::new("orac_stt_errors_total", "Total number of errors"),
            &["error_type"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(active_requests.clone()))?;
        registry.register(Box::new(inference_duration.clone()))?;
        registry.register(Box::new(audio_duration.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            active_requests,
            inference_duration,
            audio_duration,
            errors_total,
        })
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to encode metrics");
                String::new()
            })
    }
}

/// `GET /metrics`
pub async fn serve_metrics(State(state): State<AppState>) -> Response {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.encode(),
    )
        .into_response()
}

/// Middleware recording per-request count, duration and in-flight gauge.
///
/// The endpoint label uses the matched route template (`/stt/v1/stream/{topic}`)
/// rather than the raw path, keeping label cardinality bounded.
pub async fn track_http(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_string(), |p| p.as_str().to_string());

    state.metrics.active_requests.inc();
    let started = std::time::Instant::now();

    let response = next.run(request).await;

    state
        .metrics
        .request_duration
        .with_label_values(&[&method, &endpoint])
        .observe(started.elapsed().as_secs_f64());
    state
        .metrics
        .requests_total
        .with_label_values(&[&method, &endpoint, response.status().as_str()])
        .inc();
    state.metrics.active_requests.dec();

    response
}
