//! Loading agent configuration (prompts + pipeline tuning + quotas) from TOML.
//!
//! See `AgentConfig`, `Prompts` and `PipelineSettings` for expected schema.
//! Every section is optional; missing keys fall back to the defaults below.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub pipeline: PipelineSettings,
  #[serde(default)]
  pub quotas: QuotaSettings,
}

/// Prompts used by the Prompt Builder and the grading engine.
/// You can override them in TOML if you need to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Full course (or chunk) generation
  pub course_system: String,
  pub course_user_template: String,
  pub continuation_template: String,
  pub all_levels_note: String,
  pub gamification_note: String,
  pub step_schema: String,
  // Outline-only generation
  pub outline_system: String,
  pub outline_user_template: String,
  // Single lesson generation
  pub lesson_system: String,
  pub lesson_user_template: String,
  // Rubric grading
  pub grading_system: String,
  pub grading_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      course_system: "You are an expert curriculum designer writing interactive lessons. Respond ONLY with strict JSON. Never put raw line breaks inside string values; use \\n.".into(),
      course_user_template: "Create lessons {first_lesson} to {last_lesson} of a {total_lessons}-lesson course.\nSubject: {subject}\nAudience: {level}\nTopic: {topic}\nDifficulty: {difficulty}\nCurriculum/locale: {locale}\n{level_note}{gamification_note}{continuation_note}\nReturn JSON: {\"title\": string, \"description\": string, \"lessons\": [{\"number\": int, \"title\": string, \"theory\": string, \"curriculum\": {\"framework\": string, \"objectives\": [string]}, \"steps\": [step]}]}\nEach lesson needs at least 5 steps including one of each: multiple_choice, fill_blank, true_false, matching.\n{step_schema}".into(),
      continuation_template: "Lessons already written: {covered}.\nDo NOT repeat any of those topics. Continue the course from lesson {first_lesson}, building on where the previous lesson ended.\n".into(),
      all_levels_note: "This course spans all levels: progress from beginner foundations to advanced mastery across the full curriculum.\n".into(),
      gamification_note: "Gamify the lessons: give every exercise step an integer \"xp\" reward (10-50) and phrase exercises as challenges.\n".into(),
      step_schema: "Step shapes (field \"type\" selects the shape):\n- {\"type\":\"theory\",\"title\":s,\"text\":s,\"examples\":[s]}\n- {\"type\":\"multiple_choice\",\"title\":s,\"question\":s,\"options\":[4 strings],\"correct\":\"A\"|\"B\"|\"C\"|\"D\"}\n- {\"type\":\"fill_blank\",\"title\":s,\"sentence\":\"... ____ ...\",\"answer\":s}\n- {\"type\":\"true_false\",\"title\":s,\"statement\":s,\"answer\":true|false}\n- {\"type\":\"matching\",\"title\":s,\"pairs\":[{\"left\":s,\"right\":s}] (4-6 pairs)}\n- {\"type\":\"ordering\",\"title\":s,\"items\":[s],\"correct_order\":[indices]}".into(),
      outline_system: "You are an expert curriculum designer. Respond ONLY with strict JSON.".into(),
      outline_user_template: "Outline a {lesson_count}-lesson course.\nSubject: {subject}\nAudience: {level}\nTopic: {topic}\nDifficulty: {difficulty}\nCurriculum/locale: {locale}\n{level_note}Return JSON: {\"title\": string, \"description\": string, \"lessons\": [{\"number\": int, \"title\": string, \"summary\": string}]} with exactly {lesson_count} lessons, each covering a distinct topic.".into(),
      lesson_system: "You are an expert teacher writing one interactive lesson. Respond ONLY with strict JSON. Never put raw line breaks inside string values; use \\n.".into(),
      lesson_user_template: "Course: {course_title}\nSubject: {subject}\nAudience: {level}\nDifficulty: {difficulty}\nCurriculum/locale: {locale}\nWrite lesson {lesson_number}: {lesson_title}\nScope: {lesson_summary}\n{gamification_note}Return JSON: {\"number\": int, \"title\": string, \"theory\": string, \"curriculum\": {\"framework\": string, \"objectives\": [string]}, \"steps\": [step]} with at least 5 steps including one of each: multiple_choice, fill_blank, true_false, matching.\n{step_schema}".into(),
      grading_system: "You are a fair, consistent exam grader. Award partial credit for partially correct answers. Respond ONLY with strict JSON.".into(),
      grading_user_template: "Grade every question below. Each entry has the question type, the correct answer, the student's answer and the maximum marks.\n{questions_json}\nReturn JSON: {\"results\": [{\"question_id\": string, \"score\": number (0..max_marks), \"feedback\": string}]} with one result per question.".into(),
    }
  }
}

/// Tuning knobs for generation and grading. Retry counts, backoff and the
/// duplicate threshold are empirical and meant to be tuned here.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
  /// Requests with more lessons than this are generated in two chunks.
  pub chunk_threshold: u32,
  /// Upper bound on lessons per request, for whole courses and outlines alike.
  pub max_lessons_per_course: u32,
  pub max_retries: u32,
  pub backoff_base_ms: u64,
  pub backoff_jitter_ms: u64,
  pub duplicate_threshold: f64,
  pub min_steps_per_lesson: usize,
  pub outline_timeout_secs: u64,
  pub lesson_timeout_secs: u64,
  pub grading_timeout_secs: u64,
  pub inter_lesson_delay_ms: u64,
  pub tokens_per_lesson: u32,
  pub min_output_tokens: u32,
  pub max_output_tokens: u32,
  pub all_levels_max_output_tokens: u32,
  pub generation_temperature: f32,
  pub grading_temperature: f32,
}

impl Default for PipelineSettings {
  fn default() -> Self {
    Self {
      chunk_threshold: 6,
      max_lessons_per_course: 40,
      max_retries: 2,
      backoff_base_ms: 1_000,
      backoff_jitter_ms: 0,
      duplicate_threshold: 0.7,
      min_steps_per_lesson: 5,
      outline_timeout_secs: 60,
      lesson_timeout_secs: 180,
      grading_timeout_secs: 45,
      inter_lesson_delay_ms: 1_500,
      tokens_per_lesson: 1_800,
      min_output_tokens: 4_000,
      max_output_tokens: 16_000,
      all_levels_max_output_tokens: 32_000,
      generation_temperature: 0.7,
      grading_temperature: 0.2,
    }
  }
}

impl PipelineSettings {
  pub fn outline_timeout(&self) -> Duration {
    Duration::from_secs(self.outline_timeout_secs)
  }

  pub fn lesson_timeout(&self) -> Duration {
    Duration::from_secs(self.lesson_timeout_secs)
  }

  pub fn grading_timeout(&self) -> Duration {
    Duration::from_secs(self.grading_timeout_secs)
  }

  pub fn inter_lesson_delay(&self) -> Duration {
    Duration::from_millis(self.inter_lesson_delay_ms)
  }
}

/// Per-account limits enforced by the in-memory usage ledger.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct QuotaSettings {
  pub course_creation: u32,
  pub lesson_generation: u32,
}

impl Default for QuotaSettings {
  fn default() -> Self {
    Self { course_creation: 20, lesson_generation: 200 }
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "lessonforge_backend", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "lessonforge_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "lessonforge_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
