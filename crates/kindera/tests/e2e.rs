// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end test over the full wiring: gateway router, session
//! manager, turn pipeline, tools, and a file-backed usage ledger, with
//! the model provider and ops backend mocked.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use kindera_config::model::{
    AgentConfig, ContextConfig, ModelConfig, SelectorConfig, ToolsConfig, UsageConfig,
};
use kindera_context::ContextCompressor;
use kindera_gateway::{GatewayState, router};
use kindera_selector::{SelectionCache, ToolSelector};
use kindera_session::{SessionManager, TurnRunner};
use kindera_test_utils::{MockBackend, MockProvider, text_response, tool_use_response};
use kindera_tools::ToolExecutor;
use kindera_usage::{UsageLedger, UsageMonitor};
use tower::ServiceExt;

async fn app(provider: Arc<MockProvider>, backend: Arc<MockBackend>, ledger_path: &str) -> Router {
    let registry = Arc::new(kindera_tools::builtin_registry(backend));
    let selector_cfg = SelectorConfig::default();
    let cache = Arc::new(SelectionCache::new(
        selector_cfg.cache_capacity,
        Duration::from_secs(selector_cfg.cache_ttl_secs),
    ));
    let monitor = Arc::new(UsageMonitor::new(&UsageConfig::default()));
    let runner = Arc::new(TurnRunner {
        provider,
        registry: Arc::clone(&registry),
        executor: Arc::new(ToolExecutor::new(registry, ToolsConfig::default())),
        selector: Arc::new(ToolSelector::new(selector_cfg.max_tools)),
        cache: Arc::clone(&cache),
        compressor: Arc::new(ContextCompressor::new("kindera", &ContextConfig::default())),
        ledger: Arc::new(UsageLedger::open(ledger_path).await.unwrap()),
        monitor: Arc::clone(&monitor),
        model: ModelConfig {
            api_key: Some("test".into()),
            ..ModelConfig::default()
        },
    });
    let manager = Arc::new(SessionManager::new(runner, &AgentConfig::default()));
    router(GatewayState::new(manager, monitor, cache))
}

fn post_message(message: &str, conversation_id: &str) -> Request<Body> {
    let body = serde_json::json!({
        "message": message,
        "conversation_id": conversation_id,
        "user_id": "u-1",
        "context": { "role": "admin", "tools_enabled": true },
    });
    Request::builder()
        .method("POST")
        .uri("/v1/assistant/messages")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn sse_body(response: axum::response::Response) -> String {
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn missing_fields_pause_and_resume_across_requests() {
    let provider = Arc::new(MockProvider::with_responses(vec![
        tool_use_response(
            None,
            "toolu_1",
            "create_record",
            serde_json::json!({"entity": "classes", "values": {"name": "小一班"}}),
        ),
        text_response("班级「小一班」已创建。"),
    ]));
    let backend = Arc::new(MockBackend::new());
    backend.set_response("classes", serde_json::json!({"id": 7, "name": "小一班"}));

    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("usage.sqlite");
    let app = app(
        provider,
        Arc::clone(&backend),
        ledger_path.to_str().unwrap(),
    )
    .await;

    // First message: the model asks for a create, a required field is
    // absent, so the turn parks and the stream ends without a terminal
    // complete event.
    let response = app
        .clone()
        .oneshot(post_message("新增一个班级", "conv-1"))
        .await
        .unwrap();
    let body = sse_body(response).await;
    assert!(body.contains("event: start"));
    assert!(body.contains("event: missing_fields"));
    assert!(body.contains("kindergarten_id"));
    assert!(!body.contains("event: complete"));
    assert!(backend.calls().iter().all(|c| !c.starts_with("create")));

    // Second message supplies the missing value; the parked create runs
    // and the turn completes with a narrated answer.
    let response = app
        .clone()
        .oneshot(post_message("kg-1", "conv-1"))
        .await
        .unwrap();
    let body = sse_body(response).await;
    assert!(body.contains("event: tool_call"));
    assert!(body.contains("event: tool_result"));
    assert!(body.contains("event: answer"));
    assert!(body.contains("event: complete"));
    assert!(backend.calls().iter().any(|c| c.starts_with("create classes")));

    // Usage from both turns is visible on the usage endpoint.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/assistant/usage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(value["usage"]["daily_tokens"].as_u64().unwrap_or(0) > 0);
}

#[tokio::test]
async fn plain_question_round_trip() {
    let provider = Arc::new(MockProvider::with_responses(vec![text_response(
        "幼儿园每天 8 点开园。",
    )]));
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("usage.sqlite");
    let app = app(
        provider,
        Arc::new(MockBackend::new()),
        ledger_path.to_str().unwrap(),
    )
    .await;

    let response = app
        .oneshot(post_message("幼儿园几点开园？", "conv-9"))
        .await
        .unwrap();
    let body = sse_body(response).await;
    assert!(body.contains("event: start"));
    assert!(body.contains("event: answer"));
    assert!(body.contains("event: complete"));
}
