//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs identifiers and basic result info.

use std::sync::Arc;
use axum::{extract::{Path, State}, http::HeaderMap, Json};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{CourseDraft, CourseOutline, GenerationRequest, GradingReport, GradingRequest};
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

/// Authentication lives outside this service; callers identify the account by header.
const ACCOUNT_HEADER: &str = "x-account-id";

fn account_id(headers: &HeaderMap) -> String {
  headers
    .get(ACCOUNT_HEADER)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .unwrap_or("anonymous")
    .to_string()
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> Json<HealthOut> {
  Json(HealthOut { ok: true, llm_enabled: state.llm_enabled })
}

#[instrument(level = "info", skip(state, headers, body), fields(lesson_count = body.lesson_count, level = body.level))]
pub async fn http_post_course(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<GenerationRequest>,
) -> Result<Json<CourseOut>, ApiError> {
  let account = account_id(&headers);
  let out = create_course(&state, &account, &body).await?;
  info!(target: "lessonforge_backend", course_id = %out.course_id, lessons = out.draft.lessons.len(), "HTTP course created");
  Ok(Json(CourseOut { course_id: out.course_id, course: out.draft }))
}

#[instrument(level = "info", skip(state, body), fields(lesson_count = body.lesson_count))]
pub async fn http_post_outline(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerationRequest>,
) -> Result<Json<CourseOutline>, ApiError> {
  Ok(Json(create_outline(&state, &body).await?))
}

#[instrument(level = "info", skip(state, headers, body), fields(%course_id))]
pub async fn http_post_course_lessons(
  State(state): State<Arc<AppState>>,
  Path(course_id): Path<Uuid>,
  headers: HeaderMap,
  Json(body): Json<GenerateLessonsIn>,
) -> Result<Json<GenerateLessonsOut>, ApiError> {
  let account = account_id(&headers);
  let out = generate_course_lessons(&state, &account, course_id, body).await?;
  info!(target: "lessonforge_backend", %course_id, saved = out.lesson_ids.len(), "HTTP lessons generated");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state), fields(%course_id))]
pub async fn http_get_course(
  State(state): State<Arc<AppState>>,
  Path(course_id): Path<Uuid>,
) -> Result<Json<CourseDraft>, ApiError> {
  Ok(Json(get_course(&state, course_id).await?))
}

#[instrument(level = "info", skip(state, body), fields(attempt_id = %body.attempt_id, questions = body.questions.len()))]
pub async fn http_post_grade(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GradingRequest>,
) -> Result<Json<GradingReport>, ApiError> {
  let report = grade_attempt(&state, &body).await?;
  info!(target: "grading", attempt_id = %report.attempt_id, grade = %report.grade, ai = report.ai_grading_used, "HTTP attempt graded");
  Ok(Json(report))
}

#[instrument(level = "info", skip(state), fields(%attempt_id))]
pub async fn http_get_report(
  State(state): State<Arc<AppState>>,
  Path(attempt_id): Path<String>,
) -> Result<Json<GradingReport>, ApiError> {
  Ok(Json(get_report(&state, &attempt_id).await?))
}
