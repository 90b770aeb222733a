//! JSON handlers for `/ask`, `/history`, and `/health`.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};

use askgate_core::error::Error;
use askgate_core::message::ConversationTurn;
use askgate_pipeline::{AskRequest, DependencyHealth};

use crate::SharedState;

/// The only failure text a caller ever sees, validation aside.
pub const APOLOGY: &str = "Sorry, the assistant is temporarily unavailable. Please try again later.";

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

// ── Errors ────────────────────────────────────────────────────────────────

/// A classified failure at the HTTP boundary.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    PayloadTooLarge,
    BadGateway,
    Internal,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(message) => Self::BadRequest(message),
            Error::Credential(e) => {
                error!(error = %e, "Credential failure");
                Self::BadGateway
            }
            Error::Completion(e) => {
                error!(error = %e, "Upstream completion failure");
                Self::BadGateway
            }
            Error::Storage(e) => {
                error!(error = %e, "Storage failure");
                Self::Internal
            }
            Error::Config { message } | Error::Internal(message) => {
                error!(error = %message, "Internal failure");
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "request body is too large".to_string(),
            ),
            Self::BadGateway => (StatusCode::BAD_GATEWAY, APOLOGY.to_string()),
            Self::Internal => (StatusCode::INTERNAL_SERVER_ERROR, APOLOGY.to_string()),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge
        } else {
            Self::BadRequest(rejection.body_text())
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

// ── /ask ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskBody {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
}

pub async fn ask_handler(
    State(state): State<SharedState>,
    body: Result<Json<AskBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;

    let user_id = body
        .user_id
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "anonymous".to_string());
    let chat_id = body
        .chat_id
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| user_id.clone());

    let outcome = state
        .pipeline
        .handle(AskRequest::new(body.question, user_id, chat_id))
        .await?;

    let request_id = HeaderValue::from_str(&outcome.request_id().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
    Ok((
        [(HeaderName::from_static("x-request-id"), request_id)],
        Json(AskResponse {
            answer: outcome.answer().to_string(),
        }),
    ))
}

// ── /history ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default)]
    pub user_id: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryItem {
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

impl From<ConversationTurn> for HistoryItem {
    fn from(turn: ConversationTurn) -> Self {
        Self {
            role: turn.role.as_str().to_string(),
            content: turn.content,
            timestamp: turn.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub items: Vec<HistoryItem>,
}

pub async fn history_handler(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    if query.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("userId is required".into()));
    }
    let limit = query
        .limit
        .unwrap_or(state.history_default_limit)
        .clamp(1, state.history_max_limit);

    let turns = state.pipeline.history(&query.user_id, limit).await?;
    Ok(Json(HistoryResponse {
        items: turns.into_iter().map(HistoryItem::from).collect(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgetQuery {
    #[serde(default)]
    pub user_id: String,
}

pub async fn forget_handler(
    State(state): State<SharedState>,
    Query(query): Query<ForgetQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if query.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("userId is required".into()));
    }
    let removed = state.pipeline.forget(&query.user_id).await?;
    warn!(user_id = %query.user_id, removed, "History forgotten on request");
    Ok(Json(serde_json::json!({ "ok": true })))
}

// ── /health ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub credentials_configured: bool,
    pub dependencies: DependencyHealth,
}

pub async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let dependencies = state.pipeline.dependency_health(HEALTH_PROBE_TIMEOUT).await;
    Json(HealthResponse {
        ok: true,
        credentials_configured: state.pipeline.credentials_configured(),
        dependencies,
    })
}
