use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::api::dto::*;
use crate::auth::auth_middleware;
use crate::config::Config;
use crate::models::{ConversationLabels, DiaryEntry, UserId};
use crate::orchestrator::context_assembly::ContextError;
use crate::orchestrator::conversation::{ConversationController, ConversationError, TurnOutcome};
use crate::orchestrator::JournalOrchestrator;
use crate::storage::{ReconciliationReport, StoreError};

const DEFAULT_SEARCH_LIMIT: usize = 5;
const MAX_SEARCH_LIMIT: usize = 50;

pub type ConversationHandle = Arc<Mutex<ConversationController>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<JournalOrchestrator>,
    /// Active conversations. Turns on one conversation are serialized by its
    /// mutex; finalized conversations are removed.
    pub conversations: Arc<RwLock<HashMap<Uuid, ConversationHandle>>>,
}

impl AppState {
    pub fn new(config: Arc<Config>, orchestrator: Arc<JournalOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
            conversations: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: status.as_u16(),
        }),
    )
}

fn parse_user(raw: &str) -> Result<UserId, ApiError> {
    UserId::parse(raw).map_err(|e| api_error(StatusCode::BAD_REQUEST, e))
}

fn store_error(e: StoreError) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e)
}

fn context_error(e: ContextError) -> ApiError {
    match e {
        ContextError::Completion(e) if e.is_transient() => {
            api_error(StatusCode::SERVICE_UNAVAILABLE, e)
        }
        ContextError::Completion(e) => api_error(StatusCode::BAD_GATEWAY, e),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other),
    }
}

fn conversation_error(e: ConversationError) -> ApiError {
    let status = match &e {
        ConversationError::Finalized => StatusCode::CONFLICT,
        ConversationError::EmptyMessage => StatusCode::BAD_REQUEST,
        ConversationError::Chat(inner) if inner.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        ConversationError::Chat(_) => StatusCode::BAD_GATEWAY,
        ConversationError::Persistence(_) | ConversationError::Prompt(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, e)
}

fn turn_response(outcome: TurnOutcome) -> TurnResponse {
    match outcome {
        TurnOutcome::Reply(content) => TurnResponse::Reply { content },
        TurnOutcome::Declined(content) => TurnResponse::Declined { content },
        TurnOutcome::Finalized(finalized) => TurnResponse::Finalized {
            failed_fields: failed_field_names(&finalized.failures),
            notice: finalized.notice,
            entry: finalized.entry,
        },
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/users/{user_id}/conversations",
    request_body = StartConversationRequest,
    params(("user_id" = String, Path, description = "Journal owner")),
    responses(
        (status = 201, description = "Conversation started", body = StartConversationResponse),
        (status = 400, description = "Invalid user id", body = ErrorResponse)
    )
)]
pub async fn start_conversation(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<StartConversationRequest>,
) -> Result<(StatusCode, Json<StartConversationResponse>), ApiError> {
    let user = parse_user(&user_id)?;
    let initial = req
        .initial_entry
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let mut controller = state
        .orchestrator
        .start_conversation(user.clone(), initial)
        .await
        .map_err(conversation_error)?;

    let first_turn = match initial {
        Some(text) => Some(
            controller
                .handle_turn(text)
                .await
                .map(turn_response)
                .map_err(conversation_error)?,
        ),
        None => None,
    };

    let id = Uuid::new_v4();
    let status = ConversationStatusDto::from(controller.state());
    if status == ConversationStatusDto::Active {
        state
            .conversations
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(controller)));
    }

    tracing::info!("Conversation {} started for {}", id, user);
    Ok((
        StatusCode::CREATED,
        Json(StartConversationResponse {
            id,
            user_id: user.to_string(),
            status,
            first_turn,
        }),
    ))
}

async fn find_conversation(state: &AppState, id: Uuid) -> Result<ConversationHandle, ApiError> {
    state
        .conversations
        .read()
        .await
        .get(&id)
        .cloned()
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Conversation not found"))
}

#[utoipa::path(
    get,
    path = "/api/v1/conversations/{id}",
    params(("id" = Uuid, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Visible transcript and labels", body = ConversationResponse),
        (status = 404, description = "Unknown or finalized conversation", body = ErrorResponse)
    )
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let handle = find_conversation(&state, id).await?;
    let controller = handle.lock().await;

    Ok(Json(ConversationResponse {
        id,
        user_id: controller.user().to_string(),
        status: controller.state().into(),
        labels: controller.labels().clone(),
        turns: controller.session().visible_turns().cloned().collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/conversations/{id}/messages",
    request_body = MessageRequest,
    params(("id" = Uuid, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Assistant reply or the stored entry", body = TurnResponse),
        (status = 404, description = "Unknown or finalized conversation", body = ErrorResponse),
        (status = 503, description = "Chat service unavailable; resend the message", body = ErrorResponse)
    )
)]
pub async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    let handle = find_conversation(&state, id).await?;
    let mut controller = handle.lock().await;

    let outcome = controller
        .handle_turn(&req.content)
        .await
        .map_err(conversation_error)?;

    if matches!(outcome, TurnOutcome::Finalized(_)) {
        state.conversations.write().await.remove(&id);
        tracing::info!("Conversation {} finalized", id);
    }

    Ok(Json(turn_response(outcome)))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/entries",
    params(("user_id" = String, Path, description = "Journal owner")),
    responses((status = 200, description = "Stored entries in write order", body = EntriesResponse))
)]
pub async fn list_entries(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<EntriesResponse>, ApiError> {
    let user = parse_user(&user_id)?;
    let entries = state.orchestrator.store().entries(&user).await.map_err(store_error)?;

    Ok(Json(EntriesResponse {
        total: entries.len(),
        entries,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/users/{user_id}/search",
    request_body = SearchRequest,
    params(("user_id" = String, Path, description = "Journal owner")),
    responses((status = 200, description = "Nearest entries first", body = SearchResponse))
)]
pub async fn search_entries(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let user = parse_user(&user_id)?;
    if req.query.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "query must not be empty"));
    }
    let limit = req
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);

    let hits = match req.mode.unwrap_or(SearchMode::Similarity) {
        SearchMode::Similarity => state
            .orchestrator
            .store()
            .search_text(&user, &req.query, limit)
            .await
            .map_err(store_error)?,
        SearchMode::Topic => state
            .orchestrator
            .topic_search(&user, &req.query, limit)
            .await
            .map_err(context_error)?,
    };

    let results: Vec<SearchResultDto> = hits.into_iter().map(SearchResultDto::from).collect();
    Ok(Json(SearchResponse {
        total: results.len(),
        results,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/prompts",
    params(("user_id" = String, Path, description = "Journal owner")),
    responses((status = 200, description = "Suggestions for today's entry", body = PromptsResponse))
)]
pub async fn journal_prompts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PromptsResponse>, ApiError> {
    let user = parse_user(&user_id)?;
    let (starter_questions, opening_question) = tokio::join!(
        state.orchestrator.starter_questions(&user),
        state.orchestrator.opening_question(&user)
    );

    Ok(Json(PromptsResponse {
        starter_questions: starter_questions.map_err(context_error)?,
        opening_question: opening_question.map_err(context_error)?,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/reconcile",
    params(("user_id" = String, Path, description = "Journal owner")),
    responses((status = 200, description = "Ids missing from either half of the store", body = ReconciliationReport))
)]
pub async fn reconcile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ReconciliationReport>, ApiError> {
    let user = parse_user(&user_id)?;
    let report = state
        .orchestrator
        .reconcile(&user)
        .await
        .map_err(store_error)?;
    Ok(Json(report))
}

pub async fn health() -> &'static str {
    "OK"
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        start_conversation,
        get_conversation,
        post_message,
        list_entries,
        search_entries,
        journal_prompts,
        reconcile
    ),
    components(schemas(
        StartConversationRequest,
        StartConversationResponse,
        MessageRequest,
        TurnResponse,
        ConversationResponse,
        ConversationStatusDto,
        ConversationLabels,
        DiaryEntry,
        EntriesResponse,
        SearchRequest,
        SearchMode,
        SearchResponse,
        SearchResultDto,
        PromptsResponse,
        ReconciliationReport,
        ErrorResponse
    ))
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/v1/users/{user_id}/conversations", post(start_conversation))
        .route("/api/v1/conversations/{id}", get(get_conversation))
        .route("/api/v1/conversations/{id}/messages", post(post_message))
        .route("/api/v1/users/{user_id}/entries", get(list_entries))
        .route("/api/v1/users/{user_id}/search", post(search_entries))
        .route("/api/v1/users/{user_id}/prompts", get(journal_prompts))
        .route("/api/v1/users/{user_id}/reconcile", get(reconcile))
        .route_layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
