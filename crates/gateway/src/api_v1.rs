//! HTTP API v1: REST surface over the orchestrator.
//!
//! Endpoints:
//!
//! - `POST /v1/threads`                : Create a thread
//! - `GET  /v1/threads`                : List the caller's threads
//! - `GET  /v1/threads/{id}/messages`  : Messages of one thread
//! - `POST /v1/threads/{id}/messages`  : Send a message, get the reply
//! - `POST /v1/advice`                 : Structured course advice
//! - `GET  /v1/usage`                  : The caller's usage snapshot
//!
//! Every endpoint requires the `X-User-Id` header.

use axum::{
    Router,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use finmentor_agent::{
    AdviceReply, AssistantReply, CourseProgress, Orchestrator, OrchestratorError,
};
use finmentor_core::error::Rejection;
use finmentor_core::message::{Message, Thread};
use finmentor_telemetry::UsageSnapshot;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Header carrying the authenticated caller's id.
pub const USER_HEADER: &str = "x-user-id";

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the v1 API.
pub struct ApiState {
    pub orchestrator: Orchestrator,
}

impl ApiState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

pub type SharedApiState = Arc<ApiState>;

/// Build the v1 API router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/threads", get(list_threads_handler).post(create_thread_handler))
        .route(
            "/threads/{id}/messages",
            get(list_messages_handler).post(send_message_handler),
        )
        .route("/advice", post(advice_handler))
        .route("/usage", get(usage_handler))
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// An error rendered as a JSON body with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn missing_user() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "MISSING_USER",
            message: format!("missing {USER_HEADER} header"),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        let status = match &e {
            OrchestratorError::Rejected(Rejection::RateLimitExceeded { .. }) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            OrchestratorError::Rejected(Rejection::BudgetExceeded { .. }) => {
                StatusCode::PAYMENT_REQUIRED
            }
            OrchestratorError::Rejected(Rejection::ThreadNotFound(_)) => StatusCode::NOT_FOUND,
            OrchestratorError::Store(store_err) => {
                error!(error = %store_err, "Store failure while serving request");
                return Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: e.code(),
                    message: "internal storage error".into(),
                };
            }
        };
        Self {
            status,
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code.to_string(),
            }),
        )
            .into_response()
    }
}

// ── Caller identity ───────────────────────────────────────────────────────

/// The caller's user id, taken from the `X-User-Id` header.
pub struct UserId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or_else(ApiError::missing_user)
    }
}

// ── Threads ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CreateThreadRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
}

async fn create_thread_handler(
    State(state): State<SharedApiState>,
    UserId(user_id): UserId,
    Json(payload): Json<CreateThreadRequest>,
) -> Result<(StatusCode, Json<Thread>), ApiError> {
    let thread = state
        .orchestrator
        .create_thread(&user_id, &payload.title, payload.category.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

async fn list_threads_handler(
    State(state): State<SharedApiState>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<Thread>>, ApiError> {
    Ok(Json(state.orchestrator.get_threads(&user_id).await?))
}

async fn list_messages_handler(
    State(state): State<SharedApiState>,
    UserId(user_id): UserId,
    Path(thread_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    Ok(Json(state.orchestrator.get_messages(&thread_id, &user_id).await?))
}

// ── Chat ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
    #[serde(default)]
    pub locale: Option<String>,
}

async fn send_message_handler(
    State(state): State<SharedApiState>,
    UserId(user_id): UserId,
    Path(thread_id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<AssistantReply>, ApiError> {
    let locale = state.orchestrator.resolve_locale(payload.locale.as_deref());
    info!(thread_id = %thread_id, locale = %locale, text_len = payload.text.len(), "v1/messages request");

    let reply = state
        .orchestrator
        .send_message(&thread_id, &user_id, &payload.text, locale)
        .await?;
    Ok(Json(reply))
}

// ── Advice & usage ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AdviceRequest {
    #[serde(flatten)]
    pub progress: CourseProgress,
    #[serde(default)]
    pub locale: Option<String>,
}

async fn advice_handler(
    State(state): State<SharedApiState>,
    UserId(user_id): UserId,
    Json(payload): Json<AdviceRequest>,
) -> Result<Json<AdviceReply>, ApiError> {
    let locale = state.orchestrator.resolve_locale(payload.locale.as_deref());
    let reply = state
        .orchestrator
        .course_advice(&user_id, &payload.progress, locale)
        .await?;
    Ok(Json(reply))
}

async fn usage_handler(
    State(state): State<SharedApiState>,
    UserId(user_id): UserId,
) -> Result<Json<UsageSnapshot>, ApiError> {
    Ok(Json(state.orchestrator.usage_snapshot(&user_id).await?))
}
