//! Domain models: generation requests and chunks, course/lesson/step drafts,
//! and the grading request/report shapes returned to callers.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// How hard the generated exercises should be.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Easy,
  #[default]
  Medium,
  Hard,
}

impl Difficulty {
  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

fn default_locale() -> String {
  "en-US".into()
}

/// One course-creation call. Constructed once, never mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
  pub subject: String,
  /// Grade level; 0 means "all levels".
  #[serde(default)]
  pub level: u8,
  pub topic: String,
  #[serde(default)]
  pub difficulty: Difficulty,
  pub lesson_count: u32,
  /// Locale or curriculum tag, e.g. "en-US" or "uk-national-curriculum".
  #[serde(default = "default_locale")]
  pub locale: String,
  #[serde(default)]
  pub gamification: bool,
}

impl GenerationRequest {
  pub fn is_all_levels(&self) -> bool {
    self.level == 0
  }

  pub fn level_label(&self) -> String {
    if self.is_all_levels() {
      "all levels".into()
    } else {
      format!("level {}", self.level)
    }
  }
}

/// A request restricted to a contiguous range of lesson numbers.
#[derive(Clone, Debug)]
pub struct GenerationChunk {
  pub request: GenerationRequest,
  /// 0-based position of this chunk in the plan.
  pub index: usize,
  pub total: usize,
  pub first_lesson: u32,
  pub last_lesson: u32,
  /// Titles already produced by the previous chunk, joined for the prompt.
  pub covered_summary: Option<String>,
}

impl GenerationChunk {
  /// The single chunk that covers a whole request.
  pub fn whole(request: &GenerationRequest) -> Self {
    Self {
      request: request.clone(),
      index: 0,
      total: 1,
      first_lesson: 1,
      last_lesson: request.lesson_count,
      covered_summary: None,
    }
  }

  pub fn lesson_count(&self) -> u32 {
    self.last_lesson + 1 - self.first_lesson
  }
}

impl fmt::Display for GenerationChunk {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "chunk {}/{} (lessons {}-{})",
      self.index + 1,
      self.total,
      self.first_lesson,
      self.last_lesson
    )
  }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseDraft {
  pub title: String,
  pub description: String,
  pub lessons: Vec<LessonDraft>,
  /// Second-chunk titles that look like repeats of first-chunk titles. Advisory only.
  #[serde(default)]
  pub duplicate_warnings: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LessonDraft {
  pub number: u32,
  pub title: String,
  pub theory: String,
  #[serde(default)]
  pub curriculum: Option<CurriculumAlignment>,
  pub steps: Vec<StepDraft>,
}

impl LessonDraft {
  pub fn has_kind(&self, kind: StepKind) -> bool {
    self.steps.iter().any(|s| s.kind() == kind)
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumAlignment {
  pub framework: String,
  #[serde(default)]
  pub objectives: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StepDraft {
  pub title: String,
  #[serde(flatten)]
  pub content: StepContent,
  /// Reward points, only present for gamified courses.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub xp: Option<u32>,
}

impl StepDraft {
  pub fn kind(&self) -> StepKind {
    self.content.kind()
  }
}

/// Typed payload of a step. Shapes are validated when parsed from model output.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepContent {
  Theory {
    text: String,
    #[serde(default)]
    examples: Vec<String>,
  },
  /// Exactly 4 options; `correct` is a letter A-D.
  MultipleChoice {
    question: String,
    options: Vec<String>,
    correct: char,
  },
  FillBlank {
    sentence: String,
    answer: String,
  },
  TrueFalse {
    statement: String,
    answer: bool,
  },
  /// 4 to 6 pairs.
  Matching {
    pairs: Vec<MatchPair>,
  },
  /// `correct_order` is a permutation of indices into `items`.
  Ordering {
    items: Vec<String>,
    correct_order: Vec<usize>,
  },
}

impl StepContent {
  pub fn kind(&self) -> StepKind {
    match self {
      StepContent::Theory { .. } => StepKind::Theory,
      StepContent::MultipleChoice { .. } => StepKind::MultipleChoice,
      StepContent::FillBlank { .. } => StepKind::FillBlank,
      StepContent::TrueFalse { .. } => StepKind::TrueFalse,
      StepContent::Matching { .. } => StepKind::Matching,
      StepContent::Ordering { .. } => StepKind::Ordering,
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MatchPair {
  pub left: String,
  pub right: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepKind {
  Theory,
  MultipleChoice,
  FillBlank,
  TrueFalse,
  Matching,
  Ordering,
}

impl StepKind {
  /// Exercise types every lesson must contain at least once.
  pub const CORE: [StepKind; 4] = [
    StepKind::MultipleChoice,
    StepKind::FillBlank,
    StepKind::TrueFalse,
    StepKind::Matching,
  ];

  pub fn from_tag(tag: &str) -> Option<Self> {
    let t = tag.trim().to_lowercase().replace(['-', ' ', '/'], "_");
    match t.as_str() {
      "theory" | "explanation" => Some(StepKind::Theory),
      "multiple_choice" | "mcq" | "quiz" => Some(StepKind::MultipleChoice),
      "fill_blank" | "fill_in_blank" | "fill_in_the_blank" => Some(StepKind::FillBlank),
      "true_false" | "truefalse" | "true_or_false" => Some(StepKind::TrueFalse),
      "matching" | "match" => Some(StepKind::Matching),
      "ordering" | "order" | "sequence" => Some(StepKind::Ordering),
      _ => None,
    }
  }
}

/// Course skeleton produced by outline-only generation.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseOutline {
  pub title: String,
  pub description: String,
  pub lessons: Vec<OutlineEntry>,
}

impl CourseOutline {
  /// Entries numbered 1..=n in their current order.
  pub fn renumbered(mut self) -> Self {
    for (i, entry) in self.lessons.iter_mut().enumerate() {
      entry.number = i as u32 + 1;
    }
    self
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutlineEntry {
  pub number: u32,
  pub title: String,
  #[serde(default)]
  pub summary: String,
}

// -------- Grading --------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
  MultipleChoice,
  TrueFalse,
  FillBlank,
  ShortAnswer,
  Essay,
  Matching,
  Ordering,
}

impl QuestionType {
  pub fn as_str(&self) -> &'static str {
    match self {
      QuestionType::MultipleChoice => "multiple_choice",
      QuestionType::TrueFalse => "true_false",
      QuestionType::FillBlank => "fill_blank",
      QuestionType::ShortAnswer => "short_answer",
      QuestionType::Essay => "essay",
      QuestionType::Matching => "matching",
      QuestionType::Ordering => "ordering",
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub id: String,
  #[serde(rename = "type")]
  pub question_type: QuestionType,
  #[serde(default)]
  pub prompt: String,
  /// Stored correct answer; may be plain text or a JSON-encoded value.
  pub correct_answer: String,
  pub max_marks: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRequest {
  pub attempt_id: String,
  pub questions: Vec<Question>,
  /// Question id -> student answer.
  #[serde(default)]
  pub answers: HashMap<String, String>,
  /// Exam total; defaults to the sum of question marks.
  #[serde(default)]
  pub total_marks: Option<f64>,
  pub passing_mark: f64,
}

impl GradingRequest {
  pub fn exam_total_marks(&self) -> f64 {
    self
      .total_marks
      .unwrap_or_else(|| self.questions.iter().map(|q| q.max_marks).sum())
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GradeStatus {
  Correct,
  Partial,
  Incorrect,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionGradeResult {
  pub question_id: String,
  pub score: f64,
  pub max_score: f64,
  pub status: GradeStatus,
  pub feedback: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradingReport {
  pub attempt_id: String,
  pub total_score: f64,
  pub total_marks: f64,
  pub percentage: f64,
  pub grade: String,
  pub passed: bool,
  pub results: Vec<QuestionGradeResult>,
  pub ai_grading_used: bool,
  pub feedback: String,
}
