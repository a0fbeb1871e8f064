//! Public protocol structs for the HTTP endpoints (serde ready), plus the
//! API error type and its JSON error body.
//! Keep this small and stable to evolve backend and frontend independently.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{CourseDraft, CourseOutline, GenerationRequest};
use crate::error::{GenerationError, GenerationHint, StoreError};
use crate::ports::UsageAction;

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    /// False when no LLM provider is configured (grading still works via exact match).
    pub llm_enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOut {
    pub course_id: Uuid,
    pub course: CourseDraft,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateLessonsIn {
    pub request: GenerationRequest,
    /// Outline to expand; generated first when omitted.
    #[serde(default)]
    pub outline: Option<CourseOutline>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateLessonsOut {
    pub course_id: Uuid,
    pub lesson_ids: Vec<Uuid>,
    pub outline: CourseOutline,
}

//
// Errors
//

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Quota exceeded for {0:?}")]
    QuotaExceeded(UsageAction),
    #[error(transparent)]
    Generation(GenerationError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::InvalidRequest(m) => ApiError::BadRequest(m),
            GenerationError::Store(StoreError::NotFound(m)) => ApiError::NotFound(m),
            other => ApiError::Generation(other),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(m) => ApiError::NotFound(m),
            StoreError::Unexpected(m) => ApiError::Internal(m),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, hint) = match &self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone(), None),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone(), None),
            ApiError::QuotaExceeded(action) => (
                StatusCode::TOO_MANY_REQUESTS,
                "QUOTA_EXCEEDED",
                format!("Usage limit reached for {}", match action {
                    UsageAction::CourseCreation => "course creation",
                    UsageAction::LessonGeneration => "lesson generation",
                }),
                None,
            ),
            ApiError::Generation(err) => {
                let hint = err.hint();
                let (status, code) = match hint {
                    GenerationHint::ReduceScope => (StatusCode::UNPROCESSABLE_ENTITY, "GENERATION_TRUNCATED"),
                    GenerationHint::TryAgain => (StatusCode::BAD_GATEWAY, "GENERATION_FAILED"),
                    GenerationHint::ContactSupport => (StatusCode::SERVICE_UNAVAILABLE, "GENERATION_UNAVAILABLE"),
                };
                tracing::warn!(target: "lessonforge_backend", error = %err, ?hint, "Generation request failed");
                (status, code, err.to_string(), Some(hint.message().to_string()))
            }
            ApiError::Internal(detail) => {
                tracing::error!(target: "lessonforge_backend", detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        (status, Json(ErrorBody { error: ErrorDetail { code, message, hint } })).into_response()
    }
}
