//! End-to-end flows through the upload pipeline and the heartbeat fan-out,
//! against fake engine and Core servers.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use orac_stt_axum::create_router;

async fn parse_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap_or_else(|e| panic!("expected JSON body: {e}"))
}

fn upload_request(uri: &str, wav: &[u8]) -> Request<Body> {
    let (content_type, body) = common::multipart_body(wav);
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", content_type)
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn happy_upload_transcribes_and_forwards() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::fake_engine("turn on the kitchen lights").await;
    let (core_addr, core_log) = common::fake_core().await;
    let state =
        common::test_state(dir.path(), Some(engine), &format!("http://{core_addr}")).await;
    let app = create_router(state.clone());

    let response = app
        .clone()
        .oneshot(upload_request(
            "/stt/v1/stream/jarvis",
            &common::wav_fixture(1.5),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reply = parse_json(response).await;

    assert_eq!(reply["text"], "turn on the kitchen lights");
    assert!((reply["confidence"].as_f64().unwrap() - 0.95).abs() < 1e-6);
    assert!((reply["duration"].as_f64().unwrap() - 1.5).abs() < 0.01);
    assert!(reply["processing_time"].as_f64().unwrap() > 0.0);

    // One command in the ring with the transcribed text.
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/admin/commands").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let commands = parse_json(response).await;
    assert_eq!(commands.as_array().unwrap().len(), 1);
    assert_eq!(commands[0]["text"], "turn on the kitchen lights");
    assert_eq!(commands[0]["has_error"], false);

    // The fire-and-forget forward lands on the Core.
    let forwarded = common::wait_for(
        || {
            core_log
                .lock()
                .unwrap()
                .iter()
                .any(|(path, _)| path == "/v1/generate/jarvis")
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(forwarded, "no POST /v1/generate/jarvis arrived");

    let log = core_log.lock().unwrap();
    let (_, body) = log
        .iter()
        .find(|(path, _)| path == "/v1/generate/jarvis")
        .unwrap();
    assert_eq!(body["prompt"], "turn on the kitchen lights");
    assert_eq!(body["stream"], false);
    assert_eq!(body["metadata"]["source"], "orac_stt");
    assert_eq!(body["metadata"]["streaming"], false);
}

#[tokio::test]
async fn wake_words_are_stripped_from_forward_but_not_history() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::fake_engine("Hey Jarvis, turn on the lights").await;
    let (core_addr, core_log) = common::fake_core().await;
    let state =
        common::test_state(dir.path(), Some(engine), &format!("http://{core_addr}")).await;
    let app = create_router(state.clone());

    // Configure the strip list through the admin API.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/topics/jarvis/config")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"wake_words_to_strip": "hey jarvis, jarvis"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(upload_request(
            "/stt/v1/stream/jarvis",
            &common::wav_fixture(1.0),
        ))
        .await
        .unwrap();
    let reply = parse_json(response).await;
    // The response and the history keep the raw text.
    assert_eq!(reply["text"], "Hey Jarvis, turn on the lights");

    let forwarded = common::wait_for(
        || !core_log.lock().unwrap().is_empty(),
        Duration::from_secs(2),
    )
    .await;
    assert!(forwarded);
    let log = core_log.lock().unwrap();
    assert_eq!(log[0].1["prompt"], "turn on the lights");
}

#[tokio::test]
async fn engine_down_yields_zero_valued_200_and_error_command() {
    let dir = tempfile::tempdir().unwrap();
    let (core_addr, core_log) = common::fake_core().await;
    let state = common::test_state(dir.path(), None, &format!("http://{core_addr}")).await;
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(upload_request(
            "/stt/v1/stream/jarvis",
            &common::wav_fixture(1.0),
        ))
        .await
        .unwrap();
    // Engine failures are never a 5xx on this path.
    assert_eq!(response.status(), StatusCode::OK);
    let reply = parse_json(response).await;
    assert_eq!(reply["text"], "");
    assert_eq!(reply["confidence"].as_f64().unwrap(), 0.0);

    let response = app
        .oneshot(Request::builder().uri("/admin/commands").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let commands = parse_json(response).await;
    assert_eq!(commands[0]["has_error"], true);
    assert!(commands[0]["text"]
        .as_str()
        .unwrap()
        .starts_with("[Transcription Failed:"));

    // Nothing was forwarded.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(core_log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_upload_is_a_400() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path(), None, "http://127.0.0.1:59903").await;
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(upload_request("/stt/v1/stream", b"this is not audio"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The rejection still lands in the history ring.
    let response = app
        .oneshot(Request::builder().uri("/admin/commands").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let commands = parse_json(response).await;
    assert!(commands[0]["text"]
        .as_str()
        .unwrap()
        .starts_with("[Invalid Audio:"));
}

#[tokio::test]
async fn upload_without_file_field_is_a_400() {
    let dir = tempfile::tempdir().unwrap();
    let state = common::test_state(dir.path(), None, "http://127.0.0.1:59903").await;
    let app = create_router(state);

    let body = "--b\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--b--\r\n";
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/stt/v1/stream")
                .header("content-type", "multipart/form-data; boundary=b")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forward_can_be_disabled_per_request() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::fake_engine("do not forward this").await;
    let (core_addr, core_log) = common::fake_core().await;
    let state =
        common::test_state(dir.path(), Some(engine), &format!("http://{core_addr}")).await;
    let app = create_router(state);

    let response = app
        .oneshot(upload_request(
            "/stt/v1/stream/jarvis?forward_to_core=false",
            &common::wav_fixture(1.0),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reply = parse_json(response).await;
    assert_eq!(reply["text"], "do not forward this");

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(core_log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn heartbeat_fans_out_by_core_url() {
    let dir = tempfile::tempdir().unwrap();
    let (default_core, default_log) = common::fake_core().await;
    let (override_core, override_log) = common::fake_core().await;
    let state =
        common::test_state(dir.path(), None, &format!("http://{default_core}")).await;
    let app = create_router(state);

    // Route cortana to the override Core.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/topics/cortana/config")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"orac_core_url": format!("http://{override_core}")}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let heartbeat = json!({
        "source": "hey_orac",
        "instance_id": "pi-kitchen-01",
        "timestamp": "2025-06-01T00:00:00Z",
        "models": [
            {"topic": "jarvis", "wake_word": "Hey Jarvis", "status": "active",
             "last_triggered": null, "trigger_count": 3},
            {"topic": "cortana", "wake_word": "Cortana", "status": "active",
             "last_triggered": null, "trigger_count": 1},
            {"topic": "friday", "wake_word": "Friday", "status": "inactive",
             "last_triggered": null, "trigger_count": 0}
        ]
    });

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/stt/v1/heartbeat")
                .header("content-type", "application/json")
                .body(Body::from(heartbeat.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ack = parse_json(response).await;
    assert_eq!(ack["status"], "ok");
    assert_eq!(ack["topics_processed"], 2);

    // Default Core gets jarvis only; the override Core gets cortana only;
    // the inactive friday appears nowhere.
    let ok = common::wait_for(
        || {
            !default_log.lock().unwrap().is_empty() && !override_log.lock().unwrap().is_empty()
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(ok, "heartbeat batches did not arrive");

    let default = default_log.lock().unwrap();
    let (path, body) = &default[0];
    assert_eq!(path, "/v1/topics/heartbeat");
    assert_eq!(body["source"], "orac_stt");
    assert_eq!(body["upstream_source"], "hey_orac");
    let names: Vec<&str> = body["topics"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["jarvis"]);

    let overridden = override_log.lock().unwrap();
    let names: Vec<&str> = overridden[0].1["topics"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["cortana"]);

    // The registry saw all three topics.
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/admin/topics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let topics = parse_json(response).await;
    assert_eq!(topics.as_array().unwrap().len(), 3);

    // The aggregator status reflects the instance.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/stt/v1/heartbeat/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = parse_json(response).await;
    assert_eq!(status["instance_count"], 1);
    assert_eq!(status["total_active_topics"], 2);
    assert_eq!(status["total_inactive_topics"], 1);
}

#[tokio::test]
async fn history_ring_stays_bounded_under_load() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::fake_engine("lights on").await;
    let (core_addr, core_log) = common::fake_core().await;
    let state =
        common::test_state(dir.path(), Some(engine), &format!("http://{core_addr}")).await;
    let app = create_router(state);

    for _ in 0..7 {
        let response = app
            .clone()
            .oneshot(upload_request(
                "/stt/v1/stream/jarvis",
                &common::wav_fixture(0.5),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/commands?limit=100")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let commands = parse_json(response).await;
    assert_eq!(commands.as_array().unwrap().len(), 5);

    // All seven forward tasks fire even though the ring evicted two entries.
    let all_forwarded = common::wait_for(
        || core_log.lock().unwrap().len() == 7,
        Duration::from_secs(2),
    )
    .await;
    assert!(all_forwarded, "expected 7 forwards");
}
