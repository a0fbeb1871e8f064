//! Converts sanitized model JSON into typed course, lesson and step drafts.
//!
//! Parsing is lenient about shape (wrapper objects, alias field names,
//! stringly-typed booleans) and strict about payload invariants: a step whose
//! payload breaks its type's rules is dropped, never passed through untyped.
//! The Content Normalizer fills whatever was dropped.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use crate::domain::{
  CourseOutline, CurriculumAlignment, LessonDraft, MatchPair, OutlineEntry, StepContent, StepDraft, StepKind,
};

/// Course-level fields plus the lessons of one generation response.
#[derive(Debug, Clone, Default)]
pub struct ParsedCourse {
  pub title: String,
  pub description: String,
  pub lessons: Vec<LessonDraft>,
}

fn str_field(v: &Value, keys: &[&str]) -> Option<String> {
  keys.iter().find_map(|k| match v.get(*k) {
    Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
    Some(Value::Number(n)) => Some(n.to_string()),
    _ => None,
  })
}

fn string_list(v: Option<&Value>) -> Vec<String> {
  match v {
    Some(Value::Array(items)) => items
      .iter()
      .filter_map(|i| match i {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(_) => str_field(i, &["text", "label", "value"]),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
      })
      .collect(),
    _ => vec![],
  }
}

/// Unwraps `{ "course": {...} }` and `{ "lesson": {...} }` style envelopes.
fn unwrap_envelope<'a>(value: &'a Value, key: &str) -> &'a Value {
  match value.get(key) {
    Some(inner @ Value::Object(_)) => inner,
    _ => value,
  }
}

/// Accepts an object with a `lessons` array, a `course` envelope, or a bare array of lessons.
pub fn parse_course(value: &Value) -> Result<ParsedCourse, String> {
  let root = unwrap_envelope(value, "course");
  let (title, description, lessons) = match root {
    Value::Array(items) => (String::new(), String::new(), items.as_slice()),
    Value::Object(_) => {
      let lessons = match root.get("lessons") {
        Some(Value::Array(items)) => items.as_slice(),
        _ => return Err("response has no \"lessons\" array".into()),
      };
      (
        str_field(root, &["title", "course_title", "name"]).unwrap_or_default(),
        str_field(root, &["description", "summary"]).unwrap_or_default(),
        lessons,
      )
    }
    _ => return Err("response is neither an object nor an array".into()),
  };

  let lessons: Vec<LessonDraft> = lessons.iter().filter_map(parse_lesson).collect();
  Ok(ParsedCourse { title, description, lessons })
}

/// One lesson object. Returns None only when the value is not an object.
pub fn parse_lesson(value: &Value) -> Option<LessonDraft> {
  let v = unwrap_envelope(value, "lesson");
  if !v.is_object() {
    return None;
  }

  let number = ["number", "lesson_number", "lessonNumber"]
    .iter()
    .find_map(|k| v.get(*k).and_then(Value::as_u64))
    .unwrap_or(0) as u32;

  // Non-text theory (objects, arrays) becomes empty; the normalizer substitutes a fallback.
  let theory = match v.get("theory").or_else(|| v.get("content")) {
    Some(Value::String(s)) => s.trim().to_string(),
    _ => String::new(),
  };

  let curriculum = v
    .get("curriculum")
    .or_else(|| v.get("curriculum_alignment"))
    .or_else(|| v.get("curriculumAlignment"))
    .and_then(parse_curriculum);

  let steps = match v.get("steps").or_else(|| v.get("exercises")) {
    Some(Value::Array(items)) => items.iter().filter_map(parse_step).collect(),
    _ => vec![],
  };

  Some(LessonDraft {
    number,
    title: str_field(v, &["title", "name"]).unwrap_or_default(),
    theory,
    curriculum,
    steps,
  })
}

fn parse_curriculum(v: &Value) -> Option<CurriculumAlignment> {
  match v {
    Value::String(s) if !s.trim().is_empty() => {
      Some(CurriculumAlignment { framework: s.trim().to_string(), objectives: vec![] })
    }
    Value::Object(_) => {
      let framework = str_field(v, &["framework", "standard", "curriculum", "code"])?;
      let objectives = string_list(v.get("objectives").or_else(|| v.get("outcomes")));
      Some(CurriculumAlignment { framework, objectives })
    }
    _ => None,
  }
}

/// One typed step, or None when the type is unknown or the payload is invalid.
pub fn parse_step(value: &Value) -> Option<StepDraft> {
  let tag = value.get("type").and_then(Value::as_str)?;
  let Some(kind) = StepKind::from_tag(tag) else {
    debug!(target: "generation", %tag, "Dropping step with unknown type");
    return None;
  };
  // Payload fields may sit on the step itself or under "content".
  let payload = match value.get("content") {
    Some(inner @ Value::Object(_)) => inner,
    _ => value,
  };

  let content = match kind {
    StepKind::Theory => parse_theory(payload),
    StepKind::MultipleChoice => parse_multiple_choice(payload),
    StepKind::FillBlank => parse_fill_blank(payload),
    StepKind::TrueFalse => parse_true_false(payload),
    StepKind::Matching => parse_matching(payload),
    StepKind::Ordering => parse_ordering(payload),
  };
  let Some(content) = content else {
    debug!(target: "generation", %tag, "Dropping step with invalid payload");
    return None;
  };

  let xp = value.get("xp").and_then(Value::as_u64).map(|x| x.min(u32::MAX as u64) as u32);
  let title = str_field(value, &["title", "name"]).unwrap_or_else(|| default_step_title(kind).to_string());
  Some(StepDraft { title, content, xp })
}

fn default_step_title(kind: StepKind) -> &'static str {
  match kind {
    StepKind::Theory => "Key ideas",
    StepKind::MultipleChoice => "Choose the correct answer",
    StepKind::FillBlank => "Fill in the blank",
    StepKind::TrueFalse => "True or false?",
    StepKind::Matching => "Match the pairs",
    StepKind::Ordering => "Put these in order",
  }
}

fn parse_theory(v: &Value) -> Option<StepContent> {
  let text = match v.get("text").or_else(|| v.get("content")).or_else(|| v.get("body")) {
    Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
    _ => return None,
  };
  Some(StepContent::Theory { text, examples: string_list(v.get("examples")) })
}

const LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

fn parse_multiple_choice(v: &Value) -> Option<StepContent> {
  let question = str_field(v, &["question", "prompt", "text"])?;
  let options = string_list(v.get("options").or_else(|| v.get("choices")));
  if options.len() != 4 {
    return None;
  }
  let answer = v
    .get("correct")
    .or_else(|| v.get("answer"))
    .or_else(|| v.get("correct_answer"))?;
  let correct = match answer {
    Value::Number(n) => n.as_u64().and_then(|i| LETTERS.get(i as usize).copied())?,
    Value::String(s) => correct_letter(s, &options)?,
    _ => return None,
  };
  Some(StepContent::MultipleChoice { question, options, correct })
}

/// "B", "b", "B)", "(B)" or the option text itself.
fn correct_letter(s: &str, options: &[String]) -> Option<char> {
  let trimmed = s.trim();
  let inner = trimmed.trim_matches(|c: char| c == '(' || c == ')' || c == '.' || c == ' ');
  if inner.chars().count() == 1 {
    let letter = inner.chars().next()?.to_ascii_uppercase();
    if LETTERS.contains(&letter) {
      return Some(letter);
    }
  }
  options
    .iter()
    .position(|o| o.eq_ignore_ascii_case(trimmed))
    .map(|i| LETTERS[i])
}

fn parse_fill_blank(v: &Value) -> Option<StepContent> {
  let sentence = str_field(v, &["sentence", "question", "text", "prompt"])?;
  let answer = str_field(v, &["answer", "correct", "correct_answer"])?;
  Some(StepContent::FillBlank { sentence, answer })
}

fn parse_true_false(v: &Value) -> Option<StepContent> {
  let statement = str_field(v, &["statement", "question", "text"])?;
  let raw = v
    .get("answer")
    .or_else(|| v.get("correct"))
    .or_else(|| v.get("correct_answer"))?;
  let answer = match raw {
    Value::Bool(b) => *b,
    Value::String(s) => match s.trim().to_lowercase().as_str() {
      "true" | "t" | "yes" => true,
      "false" | "f" | "no" => false,
      _ => return None,
    },
    _ => return None,
  };
  Some(StepContent::TrueFalse { statement, answer })
}

fn parse_matching(v: &Value) -> Option<StepContent> {
  let pairs: Vec<MatchPair> = match v.get("pairs").or_else(|| v.get("matches")) {
    Some(Value::Array(items)) => items.iter().filter_map(parse_pair).collect(),
    Some(Value::Object(map)) => map
      .iter()
      .filter_map(|(k, val)| {
        val.as_str().map(|r| MatchPair { left: k.trim().to_string(), right: r.trim().to_string() })
      })
      .collect(),
    _ => return None,
  };
  if !(4..=6).contains(&pairs.len()) {
    return None;
  }
  Some(StepContent::Matching { pairs })
}

fn parse_pair(v: &Value) -> Option<MatchPair> {
  match v {
    Value::Array(items) if items.len() == 2 => Some(MatchPair {
      left: items[0].as_str()?.trim().to_string(),
      right: items[1].as_str()?.trim().to_string(),
    }),
    Value::Object(_) => Some(MatchPair {
      left: str_field(v, &["left", "term", "a"])?,
      right: str_field(v, &["right", "definition", "b"])?,
    }),
    _ => None,
  }
}

fn parse_ordering(v: &Value) -> Option<StepContent> {
  let items = string_list(v.get("items"));
  if items.len() < 2 {
    return None;
  }
  let correct_order: Vec<usize> = match v.get("correct_order").or_else(|| v.get("correctOrder")) {
    Some(Value::Array(idx)) => idx
      .iter()
      .map(|i| i.as_u64().map(|n| n as usize))
      .collect::<Option<Vec<_>>>()?,
    // Without an explicit answer the items are taken to be listed in order.
    None => (0..items.len()).collect(),
    _ => return None,
  };
  if !is_permutation(&correct_order, items.len()) {
    return None;
  }
  Some(StepContent::Ordering { items, correct_order })
}

fn is_permutation(order: &[usize], n: usize) -> bool {
  if order.len() != n {
    return false;
  }
  let seen: HashSet<usize> = order.iter().copied().filter(|i| *i < n).collect();
  seen.len() == n
}

/// Outline response: same envelopes as a course, entries renumbered by position.
pub fn parse_outline(value: &Value) -> Result<CourseOutline, String> {
  let root = unwrap_envelope(value, "course");
  let (title, description, entries) = match root {
    Value::Array(items) => (String::new(), String::new(), items.as_slice()),
    Value::Object(_) => match root.get("lessons") {
      Some(Value::Array(items)) => (
        str_field(root, &["title", "course_title", "name"]).unwrap_or_default(),
        str_field(root, &["description", "summary"]).unwrap_or_default(),
        items.as_slice(),
      ),
      _ => return Err("outline has no \"lessons\" array".into()),
    },
    _ => return Err("outline is neither an object nor an array".into()),
  };

  let lessons = entries
    .iter()
    .filter_map(|e| match e {
      Value::String(s) if !s.trim().is_empty() => Some((s.trim().to_string(), String::new())),
      Value::Object(_) => Some((
        str_field(e, &["title", "name"])?,
        str_field(e, &["summary", "description", "scope"]).unwrap_or_default(),
      )),
      _ => None,
    })
    .enumerate()
    .map(|(i, (title, summary))| OutlineEntry { number: i as u32 + 1, title, summary })
    .collect();

  Ok(CourseOutline { title, description, lessons })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn parses_course_object_with_typed_steps() {
    let v = json!({
      "title": "Fractions",
      "description": "Working with parts of a whole",
      "lessons": [{
        "number": 1,
        "title": "What is a fraction?",
        "theory": "A fraction names part of a whole.",
        "curriculum": {"framework": "CCSS 3.NF.A.1", "objectives": ["Understand unit fractions"]},
        "steps": [
          {"type": "theory", "title": "Parts", "text": "Numerator over denominator", "examples": ["1/2"]},
          {"type": "multiple_choice", "question": "Which is larger?", "options": ["1/2", "1/3", "1/4", "1/5"], "correct": "a"},
          {"type": "fill_blank", "sentence": "The top number is the ____.", "answer": "numerator"},
          {"type": "true_false", "statement": "1/2 equals 2/4", "answer": "True", "xp": 20},
          {"type": "matching", "pairs": [{"left": "1/2", "right": "half"}, {"left": "1/4", "right": "quarter"}, {"left": "1/3", "right": "third"}, ["1/10", "tenth"]]},
          {"type": "ordering", "items": ["1/4", "1/2", "3/4"], "correct_order": [0, 1, 2]}
        ]
      }]
    });
    let course = parse_course(&v).unwrap();
    assert_eq!(course.title, "Fractions");
    let lesson = &course.lessons[0];
    assert_eq!(lesson.steps.len(), 6);
    assert_eq!(lesson.curriculum.as_ref().unwrap().framework, "CCSS 3.NF.A.1");
    match &lesson.steps[1].content {
      StepContent::MultipleChoice { correct, options, .. } => {
        assert_eq!(*correct, 'A');
        assert_eq!(options.len(), 4);
      }
      other => panic!("unexpected {other:?}"),
    }
    assert_eq!(lesson.steps[3].content, StepContent::TrueFalse { statement: "1/2 equals 2/4".into(), answer: true });
    assert_eq!(lesson.steps[3].xp, Some(20));
    assert_eq!(lesson.steps[2].title, "Fill in the blank");
  }

  #[test]
  fn accepts_envelopes_and_bare_arrays() {
    let wrapped = json!({"course": {"title": "T", "lessons": [{"title": "L1"}]}});
    assert_eq!(parse_course(&wrapped).unwrap().lessons[0].title, "L1");
    let bare = json!([{"title": "L1"}, {"title": "L2"}, "not a lesson"]);
    assert_eq!(parse_course(&bare).unwrap().lessons.len(), 2);
  }

  #[test]
  fn missing_lessons_array_is_an_error() {
    assert!(parse_course(&json!({"title": "T"})).is_err());
    assert!(parse_course(&json!("text")).is_err());
  }

  #[test]
  fn invalid_payloads_are_dropped() {
    let steps = [
      json!({"type": "multiple_choice", "question": "Q", "options": ["a", "b", "c"], "correct": "A"}),
      json!({"type": "multiple_choice", "question": "Q", "options": ["a", "b", "c", "d"], "correct": "E"}),
      json!({"type": "true_false", "statement": "S", "answer": "maybe"}),
      json!({"type": "matching", "pairs": [["a", "b"], ["c", "d"], ["e", "f"]]}),
      json!({"type": "ordering", "items": ["x", "y", "z"], "correct_order": [0, 0, 2]}),
      json!({"type": "fill_blank", "sentence": "S ____"}),
      json!({"type": "essay", "prompt": "Discuss"}),
    ];
    for s in steps {
      assert!(parse_step(&s).is_none(), "{s}");
    }
  }

  #[test]
  fn correct_answer_may_be_index_or_option_text() {
    let by_index = json!({"type": "multiple_choice", "question": "Q", "options": ["a", "b", "c", "d"], "answer": 2});
    let by_text = json!({"type": "mcq", "question": "Q", "options": ["red", "green", "blue", "pink"], "correct": "Blue"});
    for (v, want) in [(by_index, 'C'), (by_text, 'C')] {
      match parse_step(&v).unwrap().content {
        StepContent::MultipleChoice { correct, .. } => assert_eq!(correct, want),
        other => panic!("unexpected {other:?}"),
      }
    }
  }

  #[test]
  fn nested_content_payload_is_supported() {
    let v = json!({"type": "fill_blank", "title": "Blank", "content": {"sentence": "2 + 2 = ____", "answer": 4}});
    let step = parse_step(&v).unwrap();
    assert_eq!(step.content, StepContent::FillBlank { sentence: "2 + 2 = ____".into(), answer: "4".into() });
  }

  #[test]
  fn non_text_theory_becomes_empty() {
    let lesson = parse_lesson(&json!({"title": "L", "theory": {"para": "x"}})).unwrap();
    assert!(lesson.theory.is_empty());
    assert!(lesson.steps.is_empty());
  }

  #[test]
  fn outline_entries_are_renumbered() {
    let v = json!({"title": "Course", "lessons": [
      {"number": 7, "title": "Intro", "summary": "Start"},
      "Second topic",
      {"summary": "no title"}
    ]});
    let outline = parse_outline(&v).unwrap();
    assert_eq!(outline.lessons.len(), 2);
    assert_eq!(outline.lessons[0].number, 1);
    assert_eq!(outline.lessons[1].number, 2);
    assert_eq!(outline.lessons[1].title, "Second topic");
  }
}
