//! Core behaviors behind the HTTP handlers.
//!
//! This includes:
//!   - Course creation with quota reservation (commit on success, release on failure)
//!   - Outline-only generation and outline-driven per-lesson generation
//!   - Grading an attempt and persisting its report
//!   - Read-side lookups for courses and reports

use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{CourseDraft, CourseOutline, GenerationRequest, GradingReport, GradingRequest};
use crate::orchestrator::GeneratedCourse;
use crate::ports::{ContentStore, Reservation, UsageAction, UsageLedger};
use crate::protocol::{ApiError, GenerateLessonsIn, GenerateLessonsOut};
use crate::state::AppState;

/// Run `op` under a usage reservation: committed when it succeeds, released otherwise.
async fn with_quota<T, Fut>(state: &AppState, account_id: &str, action: UsageAction, op: Fut) -> Result<T, ApiError>
where
  Fut: std::future::Future<Output = Result<T, ApiError>>,
{
  if state.ledger.check_and_reserve(account_id, action).await == Reservation::Denied {
    return Err(ApiError::QuotaExceeded(action));
  }
  match op.await {
    Ok(v) => {
      state.ledger.commit(account_id, action).await;
      Ok(v)
    }
    Err(e) => {
      state.ledger.release(account_id, action).await;
      Err(e)
    }
  }
}

#[instrument(level = "info", skip(state, req), fields(%account_id, lesson_count = req.lesson_count))]
pub async fn create_course(state: &AppState, account_id: &str, req: &GenerationRequest) -> Result<GeneratedCourse, ApiError> {
  let out = with_quota(state, account_id, UsageAction::CourseCreation, async {
    let generated = state.generator.generate_course(req).await?;
    Ok::<_, ApiError>(generated)
  })
  .await?;
  let used = state.ledger.used(account_id, UsageAction::CourseCreation).await;
  info!(target: "lessonforge_backend", %account_id, course_id = %out.course_id, courses_used = used, "Course created");
  Ok(out)
}

#[instrument(level = "info", skip(state, req), fields(lesson_count = req.lesson_count))]
pub async fn create_outline(state: &AppState, req: &GenerationRequest) -> Result<CourseOutline, ApiError> {
  Ok(state.generator.generate_outline(req).await?)
}

/// Expands an outline (generated on the fly when absent) into lessons saved one by one
/// into an existing course.
#[instrument(level = "info", skip(state, body), fields(%account_id, %course_id))]
pub async fn generate_course_lessons(
  state: &AppState,
  account_id: &str,
  course_id: Uuid,
  body: GenerateLessonsIn,
) -> Result<GenerateLessonsOut, ApiError> {
  if state.store.course(course_id).await.is_none() {
    return Err(ApiError::NotFound(format!("course {course_id}")));
  }

  let GenerateLessonsIn { request, outline } = body;
  with_quota(state, account_id, UsageAction::LessonGeneration, async move {
    let outline = match outline {
      Some(outline) => outline.renumbered(),
      None => state.generator.generate_outline(&request).await?,
    };
    let lesson_ids = state
      .generator
      .generate_lessons_individually(course_id, &request, &outline)
      .await?;
    Ok::<_, ApiError>(GenerateLessonsOut { course_id, lesson_ids, outline })
  })
  .await
}

#[instrument(level = "debug", skip(state))]
pub async fn get_course(state: &AppState, course_id: Uuid) -> Result<CourseDraft, ApiError> {
  state
    .store
    .course(course_id)
    .await
    .ok_or_else(|| ApiError::NotFound(format!("course {course_id}")))
}

/// Grades the attempt and persists the report. Grading itself never fails.
#[instrument(level = "info", skip(state, req), fields(attempt_id = %req.attempt_id))]
pub async fn grade_attempt(state: &AppState, req: &GradingRequest) -> Result<GradingReport, ApiError> {
  if req.attempt_id.trim().is_empty() {
    return Err(ApiError::BadRequest("attemptId is required".into()));
  }
  if req.questions.iter().any(|q| q.max_marks.is_nan() || q.max_marks < 0.0) {
    return Err(ApiError::BadRequest("question marks must be non-negative".into()));
  }
  let report = state.grader.grade_attempt(req).await;
  state.store.save_grading_report(&req.attempt_id, &report).await?;
  Ok(report)
}

#[instrument(level = "debug", skip(state))]
pub async fn get_report(state: &AppState, attempt_id: &str) -> Result<GradingReport, ApiError> {
  state
    .store
    .report(attempt_id)
    .await
    .ok_or_else(|| ApiError::NotFound(format!("report for attempt {attempt_id}")))
}
