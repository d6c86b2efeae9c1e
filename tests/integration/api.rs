use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use journal_companion::{create_router, AppState, CompletionError};
use serde_json::{json, Value};
use tower::ServiceExt;

const API_KEY: &str = "test_key_that_is_at_least_32_characters_long";

fn create_test_app(ctx: &TestContext, api_key: Option<&str>) -> Router {
    let state = AppState::new(Arc::new(ctx.config(api_key)), ctx.orchestrator.clone());
    create_router(state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(match body {
            Some(json) => Body::from(json.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn start(app: &Router, user: &str, initial_entry: Option<&str>) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        &format!("/api/v1/users/{}/conversations", user),
        Some(json!({ "initial_entry": initial_entry })),
    )
    .await
}

// ==================== HEALTH & DOCS ====================

#[tokio::test]
async fn test_health_check() {
    let ctx = TestContext::new(ScriptedCompletion::new());
    let app = create_test_app(&ctx, Some(API_KEY));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let ctx = TestContext::new(ScriptedCompletion::new());
    let app = create_test_app(&ctx, None);

    let (status, doc) = send(&app, "GET", "/api-docs/openapi.json", None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/v1/conversations/{id}/messages"].is_object());
    assert!(doc["paths"]["/api/v1/users/{user_id}/search"].is_object());
}

// ==================== AUTH ====================

#[tokio::test]
async fn test_api_requires_key_when_configured() {
    let ctx = TestContext::new(ScriptedCompletion::new());
    let app = create_test_app(&ctx, Some(API_KEY));

    let (status, body) = send(&app, "GET", "/api/v1/users/alice/entries", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);

    let request = Request::builder()
        .uri("/api/v1/users/alice/entries")
        .header("Authorization", format!("Bearer {}", API_KEY))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ==================== CONVERSATIONS ====================

#[tokio::test]
async fn test_start_conversation_without_initial_entry() {
    let ctx = TestContext::new(ScriptedCompletion::new());
    let app = create_test_app(&ctx, None);

    let (status, body) = start(&app, "alice", None).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user_id"], "alice");
    assert_eq!(body["status"], "active");
    assert!(body["first_turn"].is_null());

    let id = body["id"].as_str().unwrap();
    let (status, conversation) = send(&app, "GET", &format!("/api/v1/conversations/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(conversation["turns"], json!([]));
}

#[tokio::test]
async fn test_initial_entry_with_all_facts_finalizes_immediately() {
    let ctx = TestContext::new(finishing_script());
    let app = create_test_app(&ctx, None);

    let (status, body) = start(&app, "alice", Some(ALL_IN_ONE)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "finalized");
    assert_eq!(body["first_turn"]["type"], "finalized");
    assert_eq!(body["first_turn"]["entry"]["title"], "Thesis crunch");
    assert_eq!(body["first_turn"]["failed_fields"], json!([]));

    // Finalized conversations are not kept around
    let id = body["id"].as_str().unwrap();
    let (status, _) = send(&app, "GET", &format!("/api/v1/conversations/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, entries) = send(&app, "GET", "/api/v1/users/alice/entries", None).await;
    assert_eq!(entries["total"], 1);
}

#[tokio::test]
async fn test_message_flow_until_finalized() {
    let script = with_analytics(
        ScriptedCompletion::new()
            .on_prompt_sequence(LABELS, vec![EMOTIONS_ONLY, ALL_LABELS])
            .on_prompt(SUMMARY, SUMMARY_JSON),
    )
    .with_chat_replies(vec![Ok("What is weighing on you?".to_string())]);
    let ctx = TestContext::new(script);
    let app = create_test_app(&ctx, None);

    let (_, started) = start(&app, "alice", None).await;
    let id = started["id"].as_str().unwrap().to_string();
    let messages = format!("/api/v1/conversations/{}/messages", id);

    let (status, reply) = send(&app, "POST", &messages, Some(json!({ "content": "I'm anxious." }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, json!({ "type": "reply", "content": "What is weighing on you?" }));

    let (_, conversation) = send(&app, "GET", &format!("/api/v1/conversations/{}", id), None).await;
    assert_eq!(conversation["status"], "active");
    assert_eq!(conversation["labels"]["emotions_experienced"], "anxious");
    assert!(conversation["labels"]["desired_state"].is_null());
    assert_eq!(conversation["turns"].as_array().unwrap().len(), 2);
    assert_eq!(conversation["turns"][0]["role"], "user");

    let (status, done) = send(
        &app,
        "POST",
        &messages,
        Some(json!({ "content": "My thesis is behind and I want a draft by Friday." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["type"], "finalized");
    assert_eq!(done["notice"], journal_companion::orchestrator::conversation::COMPLETION_NOTICE);
    assert_eq!(done["entry"]["key_topics"], json!(["Studies", "Productivity"]));

    let (status, _) = send(&app, "POST", &messages, Some(json!({ "content": "hello?" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_analytics_field_is_reported() {
    let script = with_analytics(
        ScriptedCompletion::new()
            .on_prompt(LABELS, ALL_LABELS)
            .on_prompt(SUMMARY, SUMMARY_JSON)
            .on_prompt_error(TENDENCIES, CompletionError::Transient("overloaded".to_string())),
    );
    let ctx = TestContext::new(script);
    let app = create_test_app(&ctx, None);

    let (_, body) = start(&app, "alice", Some(ALL_IN_ONE)).await;

    assert_eq!(body["first_turn"]["failed_fields"], json!(["mental_tendencies"]));
    assert_eq!(body["first_turn"]["entry"]["mental_tendencies"], json!([]));
    assert_eq!(body["first_turn"]["entry"]["emotions"], json!(["Fear", "Hope"]));
}

#[tokio::test]
async fn test_empty_message_is_bad_request() {
    let ctx = TestContext::new(ScriptedCompletion::new());
    let app = create_test_app(&ctx, None);

    let (_, started) = start(&app, "alice", None).await;
    let uri = format!("/api/v1/conversations/{}/messages", started["id"].as_str().unwrap());

    let (status, body) = send(&app, "POST", &uri, Some(json!({ "content": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn test_chat_outage_is_service_unavailable() {
    let script = ScriptedCompletion::new()
        .on_prompt(LABELS, NO_LABELS)
        .with_chat_replies(vec![Err(CompletionError::Transient("503".to_string()))]);
    let ctx = TestContext::new(script);
    let app = create_test_app(&ctx, None);

    let (_, started) = start(&app, "alice", None).await;
    let id = started["id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/conversations/{}/messages", id);

    let (status, _) = send(&app, "POST", &uri, Some(json!({ "content": "Hi" }))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    // The failed message is not part of the conversation; resending works
    let (status, reply) = send(&app, "POST", &uri, Some(json!({ "content": "Hi" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["type"], "reply");

    let (_, conversation) = send(&app, "GET", &format!("/api/v1/conversations/{}", id), None).await;
    assert_eq!(conversation["turns"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_declined_reply_is_returned_as_declined() {
    let script = ScriptedCompletion::new()
        .on_prompt(LABELS, NO_LABELS)
        .with_chat_replies(vec![Err(CompletionError::ContentRejected("SAFETY".to_string()))]);
    let ctx = TestContext::new(script);
    let app = create_test_app(&ctx, None);

    let (status, body) = start(&app, "alice", Some("something sensitive")).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "active");
    assert_eq!(body["first_turn"]["type"], "declined");
}

#[tokio::test]
async fn test_unknown_conversation_is_not_found() {
    let ctx = TestContext::new(ScriptedCompletion::new());
    let app = create_test_app(&ctx, None);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/conversations/00000000-0000-0000-0000-000000000000/messages",
        Some(json!({ "content": "hi" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn test_invalid_user_id_is_bad_request() {
    let ctx = TestContext::new(ScriptedCompletion::new());
    let app = create_test_app(&ctx, None);

    let (status, _) = start(&app, "al.ice", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/api/v1/users/al.ice/entries", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ==================== ENTRIES, SEARCH, PROMPTS ====================

#[tokio::test]
async fn test_search_modes() {
    let script = finishing_script().on_prompt(KEYWORDS, "thesis, draft");
    let ctx = TestContext::new(script);
    let app = create_test_app(&ctx, None);
    start(&app, "alice", Some(ALL_IN_ONE)).await;

    let (status, similar) = send(
        &app,
        "POST",
        "/api/v1/users/alice/search",
        Some(json!({ "query": "thesis draft", "limit": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(similar["total"], 1);
    assert_eq!(similar["results"][0]["metadata"]["title"], "Thesis crunch");

    let (status, topic) = send(
        &app,
        "POST",
        "/api/v1/users/alice/search",
        Some(json!({ "query": "how is school going", "mode": "topic" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(topic["total"], 1);
    assert_eq!(ctx.script.complete_call_count(KEYWORDS), 1);

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/users/alice/search",
        Some(json!({ "query": " " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_prompts_for_new_user() {
    let script = ScriptedCompletion::new().on_prompt(STARTERS, "1. How are you today?\n2. What's new?");
    let ctx = TestContext::new(script);
    let app = create_test_app(&ctx, None);

    let (status, body) = send(&app, "GET", "/api/v1/users/newcomer/prompts", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["starter_questions"], json!(["How are you today?", "What's new?"]));
    assert!(body["opening_question"].is_null());
}

#[tokio::test]
async fn test_prompts_outage_is_reported() {
    let script = ScriptedCompletion::new()
        .on_prompt_error(STARTERS, CompletionError::Timeout(std::time::Duration::from_secs(60)));
    let ctx = TestContext::new(script);
    let app = create_test_app(&ctx, None);

    let (status, _) = send(&app, "GET", "/api/v1/users/newcomer/prompts", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_reconcile_endpoint() {
    let ctx = TestContext::new(finishing_script());
    let app = create_test_app(&ctx, None);
    start(&app, "alice", Some(ALL_IN_ONE)).await;

    let (status, report) = send(&app, "GET", "/api/v1/users/alice/reconcile", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["row_count"], 1);
    assert_eq!(report["index_count"], 1);
    assert_eq!(report["only_in_rows"], json!([]));
    assert_eq!(report["only_in_index"], json!([]));
}
