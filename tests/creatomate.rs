mod common;

use ad_renderer::{BackendRegistry, Config, VideoResult};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use tokio_util::sync::CancellationToken;

const KEY: &str = "test-key";

#[derive(Clone)]
struct MockRenders {
    submit_reply: (u16, Value),
    polls: Arc<Mutex<VecDeque<(u16, Value)>>>,
    poll_calls: Arc<AtomicUsize>,
    submitted: Arc<Mutex<Option<Value>>>,
}

impl MockRenders {
    fn new(submit_reply: (u16, Value), polls: Vec<(u16, Value)>) -> Self {
        Self {
            submit_reply,
            polls: Arc::new(Mutex::new(polls.into())),
            poll_calls: Arc::new(AtomicUsize::new(0)),
            submitted: Arc::new(Mutex::new(None)),
        }
    }

    fn calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()).map_or(false, |v| v == format!("Bearer {KEY}"))
}

async fn submit(
    State(mock): State<MockRenders>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "invalid api key" })));
    }
    *mock.submitted.lock().unwrap() = Some(body);
    let (status, reply) = mock.submit_reply.clone();
    (StatusCode::from_u16(status).unwrap(), Json(reply))
}

async fn status(State(mock): State<MockRenders>, Path(id): Path<String>) -> (StatusCode, Json<Value>) {
    mock.poll_calls.fetch_add(1, Ordering::SeqCst);
    let next = mock.polls.lock().unwrap().pop_front();
    let (status, reply) = next.unwrap_or((200, json!({ "id": id, "status": "rendering" })));
    (StatusCode::from_u16(status).unwrap(), Json(reply))
}

async fn registry_with(mock: &MockRenders, key: &str) -> BackendRegistry {
    let router = Router::new()
        .route("/v1/renders", post(submit))
        .route("/v1/renders/:id", get(status))
        .with_state(mock.clone());
    let base = common::spawn(router).await;
    BackendRegistry::new(Arc::new(Config {
        creatomate_api_key: Some(key.into()),
        creatomate_base_url: base,
        ..common::config()
    }))
}

fn planned() -> (u16, Value) {
    (202, json!([{ "id": "r-42", "status": "planned" }]))
}

#[tokio::test]
async fn renders_are_submitted_and_polled_to_success() {
    let mock = MockRenders::new(
        planned(),
        vec![
            (200, json!({ "id": "r-42", "status": "rendering" })),
            (
                200,
                json!({
                    "id": "r-42",
                    "status": "succeeded",
                    "url": "https://cdn.test/r-42.mp4",
                    "snapshot_url": "https://cdn.test/r-42.jpg"
                }),
            ),
        ],
    );
    let registry = registry_with(&mock, KEY).await;

    let result = registry.dispatch(&common::specs(), "creatomate", &CancellationToken::new()).await;

    assert_eq!(
        result,
        VideoResult::success("https://cdn.test/r-42.mp4", 15.0).with_thumbnail(Some("https://cdn.test/r-42.jpg".into()))
    );
    assert_eq!(mock.calls(), 2);

    let body = mock.submitted.lock().unwrap().clone().unwrap();
    let source = &body["source"];
    assert_eq!(source["output_format"], "mp4");
    assert_eq!(source["frame_rate"], 30);
    assert_eq!(source["duration"], 15.0);
    let elements = source["elements"].as_array().unwrap();
    assert_eq!(elements.len(), 4);
    assert_eq!(elements[0]["fill_color"], "#112233");
    assert_eq!(elements[1]["type"], "text");
    assert_eq!(elements[1]["duration"], 14.5);
    assert_eq!(elements[1]["animations"][0]["type"], "slide");
    assert_eq!(elements[1]["animations"][0]["direction"], "up");
    // Logo content is embedded data, so it is rendered as a placeholder.
    assert_eq!(elements[2]["type"], "shape");
    assert_eq!(elements[2]["fill_color"], "#333333");
    assert_eq!(elements[2]["duration"], 4.0);
    assert_eq!(elements[2]["animations"][1]["time"], "87.5%");
    assert_eq!(elements[3]["background_color"], "#ff3366");
    assert_eq!(elements[3]["animations"][0]["type"], "pulse");
}

#[tokio::test]
async fn failed_submission_skips_polling() {
    let mock = MockRenders::new((200, json!({ "id": "r-1", "status": "failed", "error_message": "bad font" })), vec![]);
    let registry = registry_with(&mock, KEY).await;

    let result = registry.dispatch(&common::specs(), "creatomate", &CancellationToken::new()).await;

    assert_eq!(result, VideoResult::failure("bad font"));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn rejected_submission_without_render_id_reports_its_message() {
    let mock = MockRenders::new((200, json!({ "status": "failed", "error_message": "bad font" })), vec![]);
    let registry = registry_with(&mock, KEY).await;

    let result = registry.dispatch(&common::specs(), "creatomate", &CancellationToken::new()).await;

    assert_eq!(result, VideoResult::failure("bad font"));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn pending_submission_without_render_id_is_not_polled() {
    let mock = MockRenders::new((202, json!([{ "status": "planned" }])), vec![]);
    let registry = registry_with(&mock, KEY).await;

    let result = registry.dispatch(&common::specs(), "creatomate", &CancellationToken::new()).await;

    assert_eq!(result, VideoResult::failure("Render API returned no render id to poll"));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn rejected_credentials_fail_on_submit() {
    let mock = MockRenders::new(planned(), vec![]);
    let registry = registry_with(&mock, "wrong-key").await;

    let result = registry.dispatch(&common::specs(), "creatomate", &CancellationToken::new()).await;

    let error = result.error.unwrap();
    assert!(error.contains("authentication failed (HTTP 401)"), "{error}");
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn forbidden_poll_short_circuits() {
    let mock = MockRenders::new(planned(), vec![(403, json!({ "message": "forbidden" }))]);
    let registry = registry_with(&mock, KEY).await;

    let result = registry.dispatch(&common::specs(), "creatomate", &CancellationToken::new()).await;

    assert!(result.error.unwrap().contains("authentication failed (HTTP 403)"));
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn transient_poll_errors_surface_on_timeout() {
    let mock = MockRenders::new(
        planned(),
        vec![(500, json!({ "message": "upstream hiccup" })), (500, json!({ "message": "upstream hiccup" }))],
    );
    let registry = registry_with(&mock, KEY).await;

    let result = registry.dispatch(&common::specs(), "creatomate", &CancellationToken::new()).await;

    let error = result.error.unwrap();
    assert!(error.contains("timed out after 5"), "{error}");
    assert!(error.contains("HTTP 500"), "{error}");
    assert!(error.contains("upstream hiccup"), "{error}");
    assert_eq!(mock.calls(), 5);
}

#[tokio::test]
async fn submit_api_errors_carry_a_truncated_body() {
    let long = "x".repeat(1_000);
    let mock = MockRenders::new((422, json!({ "message": long })), vec![]);
    let registry = registry_with(&mock, KEY).await;

    let result = registry.dispatch(&common::specs(), "creatomate", &CancellationToken::new()).await;

    let error = result.error.unwrap();
    assert!(error.contains("HTTP 422"), "{error}");
    assert!(error.len() < 400, "{error}");
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn malformed_submission_reply_reports_the_body() {
    let mock = MockRenders::new((200, json!({ "queued": true })), vec![]);
    let registry = registry_with(&mock, KEY).await;

    let result = registry.dispatch(&common::specs(), "creatomate", &CancellationToken::new()).await;

    let error = result.error.unwrap();
    assert!(error.contains(r#"unexpected response: {"queued":true}"#), "{error}");
    assert!(!error.contains("untagged"), "{error}");
    assert_eq!(mock.calls(), 0);
}
