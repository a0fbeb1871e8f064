//! Grading Engine: LLM rubric grading with a deterministic exact-match fallback.
//!
//! One gateway call per attempt, no retries. Any failure on the AI path
//! (gateway, timeout, sanitize, parse) switches to exact matching, so every
//! attempt ends with a report.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::{PipelineSettings, Prompts};
use crate::domain::{GradeStatus, GradingReport, GradingRequest, Question, QuestionGradeResult};
use crate::ports::LlmGateway;
use crate::prompt::build_grading_prompt;
use crate::sanitize::sanitize;
use crate::util::{normalize_answer, trunc_for_log};

/// Lifecycle of one attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GradingPhase {
  Pending,
  Grading,
  GradedAi,
  GradingFallback,
  GradedExact,
}

#[derive(Clone)]
pub struct GradingEngine {
  gateway: Arc<dyn LlmGateway>,
  prompts: Prompts,
  settings: PipelineSettings,
}

impl GradingEngine {
  pub fn new(gateway: Arc<dyn LlmGateway>, prompts: Prompts, settings: PipelineSettings) -> Self {
    Self { gateway, prompts, settings }
  }

  #[instrument(
    level = "info",
    skip(self, req),
    fields(attempt_id = %req.attempt_id, questions = req.questions.len(), answers = req.answers.len())
  )]
  pub async fn grade_attempt(&self, req: &GradingRequest) -> GradingReport {
    let mut phase = GradingPhase::Pending;
    transition(&mut phase, GradingPhase::Grading);

    let (results, ai_used) = match self.grade_with_ai(req).await {
      Ok(results) => {
        transition(&mut phase, GradingPhase::GradedAi);
        (results, true)
      }
      Err(reason) => {
        warn!(target: "grading", attempt_id = %req.attempt_id, %reason, "AI grading failed; using exact match");
        transition(&mut phase, GradingPhase::GradingFallback);
        let results = req.questions.iter().map(|q| grade_exact(q, req.answers.get(&q.id))).collect();
        transition(&mut phase, GradingPhase::GradedExact);
        (results, false)
      }
    };

    let report = build_report(req, results, ai_used);
    info!(
      target: "grading",
      attempt_id = %report.attempt_id,
      total = report.total_score,
      percentage = report.percentage,
      grade = %report.grade,
      passed = report.passed,
      ai = report.ai_grading_used,
      "Attempt graded"
    );
    report
  }

  /// Rubric grading through the gateway. Questions the model skipped score
  /// zero as ungradable, but a response that matches none of the question ids
  /// is an error, so the caller falls back to exact matching. A report with
  /// `ai_grading_used == false` can therefore mean the model graded nothing.
  async fn grade_with_ai(&self, req: &GradingRequest) -> Result<Vec<QuestionGradeResult>, String> {
    if req.questions.is_empty() {
      return Err("no questions to grade".into());
    }
    let prompt = build_grading_prompt(&self.prompts, &self.settings, req);
    let timeout = self.settings.grading_timeout();

    let raw = tokio::time::timeout(timeout, self.gateway.complete(&prompt, timeout))
      .await
      .map_err(|_| format!("no response within {timeout:?}"))?
      .map_err(|e| e.to_string())?;
    debug!(target: "grading", raw_len = raw.len(), preview = %trunc_for_log(&raw, 120), "Grading response");

    let value = sanitize(&raw).map_err(|e| e.to_string())?.value;
    let by_id = parse_ai_results(&value)?;

    let matched = req.questions.iter().filter(|q| by_id.contains_key(&q.id)).count();
    if matched == 0 {
      return Err("response graded none of the questions".into());
    }

    Ok(
      req
        .questions
        .iter()
        .map(|q| match by_id.get(&q.id) {
          Some((score, feedback)) => ai_result(q, *score, feedback),
          None => {
            debug!(target: "grading", question_id = %q.id, "Question missing from AI response");
            QuestionGradeResult {
              question_id: q.id.clone(),
              score: 0.0,
              max_score: q.max_marks,
              status: GradeStatus::Incorrect,
              feedback: "Ungradable: no result was returned for this question.".into(),
            }
          }
        })
        .collect(),
    )
  }
}

fn transition(phase: &mut GradingPhase, next: GradingPhase) {
  debug!(target: "grading", from = ?*phase, to = ?next, "Grading phase");
  *phase = next;
}

/// `{ "results": [...] }` or a bare array; entries keyed by `question_id` (or `id`).
fn parse_ai_results(value: &Value) -> Result<HashMap<String, (f64, String)>, String> {
  let entries = match value {
    Value::Array(items) => items,
    _ => match value.get("results") {
      Some(Value::Array(items)) => items,
      _ => return Err("grading response has no \"results\" array".into()),
    },
  };

  let mut out = HashMap::new();
  for entry in entries {
    let id = match entry.get("question_id").or_else(|| entry.get("id")) {
      Some(Value::String(s)) => s.trim().to_string(),
      Some(Value::Number(n)) => n.to_string(),
      _ => continue,
    };
    let score = match entry.get("score") {
      Some(Value::Number(n)) => n.as_f64(),
      Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
      _ => None,
    };
    let Some(score) = score else { continue };
    let feedback = entry.get("feedback").and_then(Value::as_str).unwrap_or_default().trim().to_string();
    out.insert(id, (score, feedback));
  }
  Ok(out)
}

fn ai_result(q: &Question, score: f64, feedback: &str) -> QuestionGradeResult {
  let max = q.max_marks.max(0.0);
  let score = if score.is_finite() { score.clamp(0.0, max) } else { 0.0 };
  let status = if max > 0.0 && score >= max {
    GradeStatus::Correct
  } else if score > 0.0 {
    GradeStatus::Partial
  } else {
    GradeStatus::Incorrect
  };
  let feedback = if feedback.is_empty() { default_feedback(status).to_string() } else { feedback.to_string() };
  QuestionGradeResult { question_id: q.id.clone(), score, max_score: q.max_marks, status, feedback }
}

fn default_feedback(status: GradeStatus) -> &'static str {
  match status {
    GradeStatus::Correct => "Correct.",
    GradeStatus::Partial => "Partially correct.",
    GradeStatus::Incorrect => "Incorrect.",
  }
}

/// Full marks when the canonical forms match, zero otherwise.
pub fn grade_exact(q: &Question, answer: Option<&String>) -> QuestionGradeResult {
  let max = q.max_marks.max(0.0);
  let (score, status, feedback) = match answer.map(|a| a.trim()).filter(|a| !a.is_empty()) {
    None => (0.0, GradeStatus::Incorrect, "No answer submitted.".to_string()),
    Some(given) if canonical_answer(given) == canonical_answer(&q.correct_answer) => {
      (max, GradeStatus::Correct, "Correct.".to_string())
    }
    Some(_) => (
      0.0,
      GradeStatus::Incorrect,
      format!("Incorrect. Expected: {}", display_answer(&q.correct_answer)),
    ),
  };
  QuestionGradeResult { question_id: q.id.clone(), score, max_score: q.max_marks, status, feedback }
}

/// Decodes values that look JSON-encoded, then compares as trimmed lowercase text.
fn canonical_answer(raw: &str) -> String {
  let t = raw.trim();
  if t.starts_with(&['[', '{', '"'][..]) {
    if let Ok(v) = serde_json::from_str::<Value>(t) {
      return canonical_value(&v);
    }
  }
  normalize_answer(t)
}

fn canonical_value(v: &Value) -> String {
  match v {
    Value::String(s) => normalize_answer(s),
    Value::Array(items) => items.iter().map(canonical_value).collect::<Vec<_>>().join(", "),
    Value::Null => String::new(),
    other => normalize_answer(&other.to_string()),
  }
}

fn display_answer(raw: &str) -> String {
  let t = raw.trim();
  match serde_json::from_str::<Value>(t) {
    Ok(Value::String(s)) if t.starts_with('"') => s,
    Ok(Value::Array(items)) if t.starts_with('[') => items
      .iter()
      .map(|i| i.as_str().map(str::to_string).unwrap_or_else(|| i.to_string()))
      .collect::<Vec<_>>()
      .join(", "),
    _ => t.to_string(),
  }
}

pub fn letter_grade(percentage: f64) -> &'static str {
  match percentage {
    p if p >= 90.0 => "A+",
    p if p >= 80.0 => "A",
    p if p >= 70.0 => "B",
    p if p >= 60.0 => "C",
    p if p >= 50.0 => "D",
    _ => "F",
  }
}

fn encouragement(percentage: f64) -> &'static str {
  match percentage {
    p if p >= 90.0 => "Outstanding work!",
    p if p >= 70.0 => "Great job, keep it up!",
    p if p >= 50.0 => "Good effort. Review the questions you missed.",
    _ => "Keep practicing and revisit the lesson material before trying again.",
  }
}

pub fn build_report(req: &GradingRequest, results: Vec<QuestionGradeResult>, ai_grading_used: bool) -> GradingReport {
  let total_score: f64 = results.iter().map(|r| r.score).sum();
  let total_marks = req.exam_total_marks();
  let percentage = if total_marks > 0.0 {
    (total_score / total_marks * 100.0 * 100.0).round() / 100.0
  } else {
    0.0
  };

  let count = |s: GradeStatus| results.iter().filter(|r| r.status == s).count();
  let feedback = format!(
    "{} correct, {} partially correct, {} incorrect. {}",
    count(GradeStatus::Correct),
    count(GradeStatus::Partial),
    count(GradeStatus::Incorrect),
    encouragement(percentage)
  );

  GradingReport {
    attempt_id: req.attempt_id.clone(),
    total_score,
    total_marks,
    percentage,
    grade: letter_grade(percentage).to_string(),
    passed: total_score >= req.passing_mark,
    results,
    ai_grading_used,
    feedback,
  }
}
