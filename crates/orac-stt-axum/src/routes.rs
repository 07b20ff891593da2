//! Route definitions and router construction.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::metrics;
use crate::state::AppState;

/// Build the complete application router.
///
/// Edge producers are trusted on the LAN, so CORS is wide open — the admin
/// dashboard is served from another origin on the same host.
pub fn create_router(state: AppState) -> Router {
    let stt = Router::new()
        .route("/stream", post(handlers::stt::transcribe_default))
        .route("/stream/{topic}", post(handlers::stt::transcribe_with_topic))
        .route("/ws/stream/{topic}", get(handlers::stream_ws::stream))
        .route("/preload", post(handlers::stt::preload))
        .route("/health", get(handlers::stt::engine_health))
        .route("/heartbeat", post(handlers::heartbeat::receive))
        .route("/heartbeat/status", get(handlers::heartbeat::status))
        .route("/debug/recordings", get(handlers::stt::list_recordings))
        .route(
            "/debug/recordings/{filename}",
            get(handlers::stt::get_recording),
        );

    let admin = Router::new()
        .route("/topics", get(handlers::topics::list))
        .route("/topics/active", get(handlers::topics::list_active))
        .route(
            "/topics/{name}",
            get(handlers::topics::get).delete(handlers::topics::delete),
        )
        .route(
            "/topics/{name}/config",
            post(handlers::topics::update_config).delete(handlers::topics::remove_config),
        )
        .route("/commands", get(handlers::commands::list))
        .route("/commands/{id}/audio", get(handlers::commands::audio))
        .route("/ws", get(handlers::commands::admin_ws))
        .route(
            "/config/orac-core",
            get(handlers::config::get_core).post(handlers::config::set_core),
        )
        .route("/config/orac-core/test", post(handlers::config::test_core))
        .route("/models", get(handlers::models::list))
        .route("/models/select", post(handlers::models::select))
        .route("/models/restart", post(handlers::models::restart));

    Router::new()
        .route("/health", get(handlers::health::aggregate))
        .route("/health/live", get(handlers::health::live))
        .route("/health/ready", get(handlers::health::ready))
        .route("/metrics", get(metrics::serve_metrics))
        .nest("/stt/v1", stt)
        .nest("/admin", admin)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics::track_http,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
