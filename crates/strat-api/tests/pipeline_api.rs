//! End-to-end API tests: scripted generation backend, real dispatcher
//! against a mock production webhook.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::ServiceExt;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use strat_api::{create_router, ApiConfig, AppState};
use strat_dispatch::{Dispatch, DispatchConfig, WebhookDispatcher};
use strat_engine::PipelineConfig;
use strat_llm::{GenerationClient, GenerationError, GenerationRequest, GenerationResult};
use strat_store::MemoryRunStore;

const RESEARCH_TEXT: &str = "I bought an ergonomic chair for 4500 baht because of chronic back \
    pain after long office hours, but the lumbar support is a problem and I keep reading reviews \
    looking for a better option under my budget.";

struct ScriptedClient {
    responses: Mutex<VecDeque<GenerationResult<Value>>>,
}

impl ScriptedClient {
    fn new(responses: Vec<GenerationResult<Value>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(&self, _request: &GenerationRequest) -> GenerationResult<Value> {
        self.responses.lock().await.pop_front().unwrap_or_else(|| {
            Err(GenerationError::Misconfigured(
                "generation script exhausted".to_string(),
            ))
        })
    }
}

/// A generation backend that never answers; keeps runs in-flight so the
/// pre-review surface can be probed.
struct StalledClient;

#[async_trait]
impl GenerationClient for StalledClient {
    async fn generate(&self, _request: &GenerationRequest) -> GenerationResult<Value> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(GenerationError::Misconfigured("stalled".to_string()))
    }
}

fn topic_json(id: &str, role: &str) -> Value {
    json!({
        "topic_id": id,
        "title": format!("Title {id}"),
        "slug": id,
        "role": role,
        "hook": "hook",
        "key_points": ["point one"],
        "seo": {"primary_keyword": format!("kw {id}"), "search_volume": 800},
        "geo_queries": [{"query_text": format!("best {id} under budget"), "intent": "solution"}]
    })
}

fn happy_scripts() -> Vec<GenerationResult<Value>> {
    vec![
        Ok(json!({
            "target_persona": "Office workers with chronic back pain",
            "core_pain_points": ["back pain", "poor lumbar support"],
            "underlying_emotions": ["frustration"]
        })),
        Ok(json!({
            "proposed_topics": [topic_json("hub", "hub"), topic_json("s1", "spoke")],
            "cluster_primary_keyword": "ergonomic office chair",
            "estimated_total_search_volume": 5400
        })),
        Ok(json!({
            "hub": topic_json("hub", "hub"),
            "spokes": [topic_json("s1", "spoke")],
            "internal_links": [
                {"from_topic_id": "hub", "to_topic_id": "s1", "anchor_text": "read more", "link_type": "contextual"},
                {"from_topic_id": "s1", "to_topic_id": "hub", "anchor_text": "see the full guide", "link_type": "cta"}
            ]
        })),
    ]
}

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        stage_base_delay: Duration::from_millis(1),
        stage_max_delay: Duration::from_millis(5),
        ..PipelineConfig::default()
    }
}

fn build_app(llm: Arc<dyn GenerationClient>, dispatcher: Arc<dyn Dispatch>) -> Router {
    let state = AppState::with_components(
        ApiConfig {
            rate_limit_rps: 1000,
            ..ApiConfig::default()
        },
        Arc::new(MemoryRunStore::new()),
        llm,
        dispatcher,
        pipeline_config(),
    );
    create_router(state, None)
}

fn webhook_dispatcher(server: &MockServer) -> Arc<WebhookDispatcher> {
    Arc::new(
        WebhookDispatcher::new(DispatchConfig {
            webhook_url: Some(format!("{}/ingest", server.uri())),
            webhook_token: Some("shared-secret".to_string()),
            timeout: Duration::from_secs(5),
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        })
        .expect("dispatcher"),
    )
}

async fn request_json(
    app: &Router,
    method_str: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = match body {
        Some(b) => Request::builder()
            .method(method_str)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method_str)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn poll_status_until(app: &Router, run_id: &str, expected: &str) -> Value {
    for _ in 0..400 {
        let (status, body) = request_json(
            app,
            "GET",
            &format!("/api/pipeline/{run_id}/status"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == expected {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("run {run_id} never reached status {expected}");
}

#[tokio::test]
async fn test_full_pipeline_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .and(header_exists("Idempotency-Key"))
        .and(header_exists("X-Correlation-ID"))
        .and(header_exists("X-Signature-256"))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(json!({"job_id": "prod-77"}))
                // Delivery stays in flight long enough for the second
                // approve call to observe `dispatching`.
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let app = build_app(ScriptedClient::new(happy_scripts()), webhook_dispatcher(&server));

    // Start
    let (status, body) = request_json(
        &app,
        "POST",
        "/api/pipeline/start",
        Some(json!({"raw_text": RESEARCH_TEXT})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = body["run_id"].as_str().unwrap().to_string();
    assert_eq!(body["status"], "pending");

    // Poll until review pause
    let body = poll_status_until(&app, &run_id, "awaiting_review").await;
    assert_eq!(body["current_stage"], "Stage 4: Awaiting Human Review");
    assert_eq!(body["seo_mode"], "full_seo_geo");

    // Blueprint is readable and structurally sound
    let (status, body) = request_json(
        &app,
        "GET",
        &format!("/api/pipeline/{run_id}/blueprint"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["blueprint"]["hub"]["role"], "hub");
    assert_eq!(body["blueprint"]["spokes"].as_array().unwrap().len(), 1);
    assert_eq!(body["blueprint"]["pipeline_run_id"], run_id.as_str());

    // Approve (twice: idempotent)
    let (status, first) = request_json(
        &app,
        "POST",
        &format!("/api/pipeline/{run_id}/approve"),
        Some(json!({"approved_by": "reviewer"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, second) = request_json(
        &app,
        "POST",
        &format!("/api/pipeline/{run_id}/approve"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], second["status"]);

    // Delivery completes exactly once (mock expects 1 request)
    poll_status_until(&app, &run_id, "completed").await;

    // Run shows up in the listing
    let (status, body) = request_json(&app, "GET", "/api/pipeline", None).await;
    assert_eq!(status, StatusCode::OK);
    let runs = body["runs"].as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["run_id"], run_id.as_str());
    assert_eq!(runs[0]["status"], "completed");
}

#[tokio::test]
async fn test_unknown_run_is_404() {
    let server = MockServer::start().await;
    let app = build_app(ScriptedClient::new(vec![]), webhook_dispatcher(&server));

    let (status, _) = request_json(&app, "GET", "/api/pipeline/nope/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request_json(&app, "POST", "/api/pipeline/nope/approve", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blueprint_and_approve_conflict_before_review() {
    let server = MockServer::start().await;
    let app = build_app(Arc::new(StalledClient), webhook_dispatcher(&server));

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/pipeline/start",
        Some(json!({"raw_text": RESEARCH_TEXT})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    // The run is still generating: no blueprint, no approval.
    let (status, body) = request_json(
        &app,
        "GET",
        &format!("/api/pipeline/{run_id}/blueprint"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["detail"].as_str().unwrap().contains("not ready"));

    let (status, _) = request_json(
        &app,
        "POST",
        &format!("/api/pipeline/{run_id}/approve"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_rejected_input_surfaces_error_in_status() {
    let server = MockServer::start().await;
    let app = build_app(ScriptedClient::new(vec![]), webhook_dispatcher(&server));

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/pipeline/start",
        Some(json!({"raw_text": "shor"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let body = poll_status_until(&app, &run_id, "rejected").await;
    assert!(!body["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_raw_text_is_validation_error() {
    let server = MockServer::start().await;
    let app = build_app(ScriptedClient::new(vec![]), webhook_dispatcher(&server));

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/pipeline/start",
        Some(json!({"raw_text": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("raw_text"));
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = MockServer::start().await;
    let app = build_app(ScriptedClient::new(vec![]), webhook_dispatcher(&server));

    let (status, body) = request_json(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
