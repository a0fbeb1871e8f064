//! Prompt Builder: turns requests, chunks, outline entries and exams into
//! `PromptConfig`s (instructions + sampling parameters). Pure and deterministic.

use serde_json::json;

use crate::config::{PipelineSettings, Prompts};
use crate::domain::{GenerationChunk, GenerationRequest, GradingRequest, OutlineEntry};
use crate::util::fill_template;

/// Everything the gateway needs for one completion.
#[derive(Clone, Debug, PartialEq)]
pub struct PromptConfig {
  pub system: String,
  pub user: String,
  pub temperature: f32,
  pub max_output_tokens: u32,
  /// Ask the provider for a JSON object response.
  pub json_output: bool,
}

/// Output-size budget for `lesson_count` full lessons.
/// "All levels" courses get a 1.5x budget and a larger, curriculum-wide cap.
pub fn output_budget(settings: &PipelineSettings, lesson_count: u32, all_levels: bool) -> u32 {
  let mut raw = settings.tokens_per_lesson.saturating_mul(lesson_count);
  let cap = if all_levels {
    raw = raw.saturating_add(raw / 2);
    settings.all_levels_max_output_tokens
  } else {
    settings.max_output_tokens
  };
  let floor = settings.min_output_tokens;
  raw.clamp(floor.min(cap), cap.max(floor))
}

fn request_pairs(req: &GenerationRequest) -> Vec<(&'static str, String)> {
  vec![
    ("subject", req.subject.clone()),
    ("level", req.level_label()),
    ("topic", req.topic.clone()),
    ("difficulty", req.difficulty.as_str().to_string()),
    ("locale", req.locale.clone()),
    ("lesson_count", req.lesson_count.to_string()),
    ("total_lessons", req.lesson_count.to_string()),
  ]
}

fn render(tpl: &str, pairs: &[(&'static str, String)]) -> String {
  let borrowed: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (*k, v.as_str())).collect();
  fill_template(tpl, &borrowed)
}

fn level_note(prompts: &Prompts, req: &GenerationRequest) -> String {
  if req.is_all_levels() { prompts.all_levels_note.clone() } else { String::new() }
}

fn gamification_note(prompts: &Prompts, req: &GenerationRequest) -> String {
  if req.gamification { prompts.gamification_note.clone() } else { String::new() }
}

/// Prompt for a full course or one chunk of it. When the chunk carries an
/// "already covered" summary, the instructions forbid repeating those topics.
pub fn build_course_prompt(prompts: &Prompts, settings: &PipelineSettings, chunk: &GenerationChunk) -> PromptConfig {
  let req = &chunk.request;
  let mut pairs = request_pairs(req);
  pairs.push(("first_lesson", chunk.first_lesson.to_string()));
  pairs.push(("last_lesson", chunk.last_lesson.to_string()));

  let continuation = match &chunk.covered_summary {
    Some(covered) if !covered.trim().is_empty() => render(
      &prompts.continuation_template,
      &[("covered", covered.clone()), ("first_lesson", chunk.first_lesson.to_string())],
    ),
    _ => String::new(),
  };
  pairs.push(("continuation_note", continuation));
  pairs.push(("level_note", level_note(prompts, req)));
  pairs.push(("gamification_note", gamification_note(prompts, req)));
  pairs.push(("step_schema", prompts.step_schema.clone()));

  PromptConfig {
    system: prompts.course_system.clone(),
    user: render(&prompts.course_user_template, &pairs),
    temperature: settings.generation_temperature,
    max_output_tokens: output_budget(settings, chunk.lesson_count(), req.is_all_levels()),
    json_output: true,
  }
}

/// Prompt for outline-only generation (titles and summaries, no steps).
pub fn build_outline_prompt(prompts: &Prompts, settings: &PipelineSettings, req: &GenerationRequest) -> PromptConfig {
  let mut pairs = request_pairs(req);
  pairs.push(("level_note", level_note(prompts, req)));
  PromptConfig {
    system: prompts.outline_system.clone(),
    user: render(&prompts.outline_user_template, &pairs),
    temperature: settings.generation_temperature,
    max_output_tokens: settings.min_output_tokens,
    json_output: true,
  }
}

/// Prompt for one lesson of an outlined course.
pub fn build_lesson_prompt(
  prompts: &Prompts,
  settings: &PipelineSettings,
  req: &GenerationRequest,
  course_title: &str,
  entry: &OutlineEntry,
) -> PromptConfig {
  let mut pairs = request_pairs(req);
  pairs.push(("course_title", course_title.to_string()));
  pairs.push(("lesson_number", entry.number.to_string()));
  pairs.push(("lesson_title", entry.title.clone()));
  pairs.push(("lesson_summary", entry.summary.clone()));
  pairs.push(("gamification_note", gamification_note(prompts, req)));
  pairs.push(("step_schema", prompts.step_schema.clone()));
  PromptConfig {
    system: prompts.lesson_system.clone(),
    user: render(&prompts.lesson_user_template, &pairs),
    temperature: settings.generation_temperature,
    max_output_tokens: output_budget(settings, 1, req.is_all_levels()),
    json_output: true,
  }
}

/// Rubric-grading prompt listing every question with its type, correct
/// answer, the student's answer and max marks.
pub fn build_grading_prompt(prompts: &Prompts, settings: &PipelineSettings, req: &GradingRequest) -> PromptConfig {
  let entries: Vec<serde_json::Value> = req
    .questions
    .iter()
    .map(|q| {
      json!({
        "question_id": q.id,
        "type": q.question_type.as_str(),
        "question": q.prompt,
        "correct_answer": q.correct_answer,
        "student_answer": req.answers.get(&q.id).map(String::as_str).unwrap_or(""),
        "max_marks": q.max_marks,
      })
    })
    .collect();
  let questions_json = serde_json::Value::Array(entries).to_string();

  PromptConfig {
    system: prompts.grading_system.clone(),
    user: fill_template(&prompts.grading_user_template, &[("questions_json", &questions_json)]),
    temperature: settings.grading_temperature,
    max_output_tokens: settings.min_output_tokens,
    json_output: true,
  }
}
