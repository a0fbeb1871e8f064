//! Content Normalizer: fills in whatever structure a parsed lesson is missing
//! (title, theory, curriculum alignment, the four core exercise types and the
//! step floor) from deterministic, topic-parameterized templates.
//!
//! Additive only: LLM-authored steps keep their order and content.

use crate::domain::{CurriculumAlignment, LessonDraft, MatchPair, StepContent, StepDraft, StepKind};

/// Course-level facts the templates are parameterized with.
#[derive(Clone, Debug)]
pub struct NormalizeContext<'a> {
  pub subject: &'a str,
  pub topic: &'a str,
  pub locale: &'a str,
  pub min_steps: usize,
  /// Default reward for synthesized steps in gamified courses.
  pub default_xp: Option<u32>,
}

pub fn normalize(mut lesson: LessonDraft, ctx: &NormalizeContext<'_>) -> LessonDraft {
  if lesson.title.trim().is_empty() {
    lesson.title = format!("Lesson {}: {}", lesson.number, ctx.topic);
  }
  if lesson.theory.trim().is_empty() {
    lesson.theory = fallback_theory(&lesson.title, ctx);
  }
  if lesson.curriculum.is_none() {
    lesson.curriculum = Some(CurriculumAlignment {
      framework: format!("{} ({})", ctx.subject, ctx.locale),
      objectives: vec![format!("Understand the key ideas of {}", lesson.title)],
    });
  }

  for kind in StepKind::CORE {
    if !lesson.has_kind(kind) {
      let content = core_template(kind, ctx.topic, &lesson.title);
      lesson.steps.push(synthesized(kind, content, ctx));
    }
  }

  let mut filler = 1;
  while lesson.steps.len() < ctx.min_steps {
    let content = StepContent::FillBlank {
      sentence: format!("Review {filler}: this lesson is about ____."),
      answer: ctx.topic.to_string(),
    };
    lesson.steps.push(synthesized(StepKind::FillBlank, content, ctx));
    filler += 1;
  }

  lesson
}

fn fallback_theory(title: &str, ctx: &NormalizeContext<'_>) -> String {
  format!(
    "In this lesson we explore {title}, part of {} in {}. Read each step carefully, try the exercises, and review any answer you miss.",
    ctx.topic, ctx.subject
  )
}

fn synthesized(kind: StepKind, content: StepContent, ctx: &NormalizeContext<'_>) -> StepDraft {
  let title = match kind {
    StepKind::MultipleChoice => "Quick check",
    StepKind::FillBlank => "Fill in the blank",
    StepKind::TrueFalse => "True or false?",
    StepKind::Matching => "Match the ideas",
    StepKind::Theory => "Key ideas",
    StepKind::Ordering => "Put these in order",
  };
  StepDraft { title: title.to_string(), content, xp: ctx.default_xp }
}

fn core_template(kind: StepKind, topic: &str, lesson_title: &str) -> StepContent {
  match kind {
    StepKind::MultipleChoice => StepContent::MultipleChoice {
      question: format!("Which topic does \"{lesson_title}\" belong to?"),
      options: vec![
        topic.to_string(),
        "None of these".to_string(),
        "An unrelated subject".to_string(),
        "It cannot be determined".to_string(),
      ],
      correct: 'A',
    },
    StepKind::FillBlank => StepContent::FillBlank {
      sentence: format!("\"{lesson_title}\" is a lesson about ____."),
      answer: topic.to_string(),
    },
    StepKind::TrueFalse => StepContent::TrueFalse {
      statement: format!("\"{lesson_title}\" is part of learning about {topic}."),
      answer: true,
    },
    StepKind::Matching => StepContent::Matching {
      pairs: vec![
        MatchPair { left: "Lesson".into(), right: lesson_title.to_string() },
        MatchPair { left: "Topic".into(), right: topic.to_string() },
        MatchPair { left: "Read".into(), right: "Theory".into() },
        MatchPair { left: "Practice".into(), right: "Exercises".into() },
      ],
    },
    StepKind::Theory => StepContent::Theory { text: format!("Key ideas of {lesson_title}."), examples: vec![] },
    StepKind::Ordering => StepContent::Ordering {
      items: vec!["Read the theory".into(), "Try the exercises".into(), "Review mistakes".into()],
      correct_order: vec![0, 1, 2],
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ctx() -> NormalizeContext<'static> {
    NormalizeContext { subject: "Mathematics", topic: "Fractions", locale: "en-US", min_steps: 5, default_xp: None }
  }

  fn step(content: StepContent) -> StepDraft {
    StepDraft { title: "authored".into(), content, xp: None }
  }

  fn mc() -> StepDraft {
    step(StepContent::MultipleChoice {
      question: "q".into(),
      options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
      correct: 'B',
    })
  }

  fn fb() -> StepDraft {
    step(StepContent::FillBlank { sentence: "s ____".into(), answer: "x".into() })
  }

  fn tf() -> StepDraft {
    step(StepContent::TrueFalse { statement: "s".into(), answer: false })
  }

  fn matching() -> StepDraft {
    step(StepContent::Matching {
      pairs: (0..4).map(|i| MatchPair { left: format!("l{i}"), right: format!("r{i}") }).collect(),
    })
  }

  fn theory() -> StepDraft {
    step(StepContent::Theory { text: "t".into(), examples: vec![] })
  }

  fn assert_invariants(lesson: &LessonDraft) {
    assert!(lesson.steps.len() >= 5, "only {} steps", lesson.steps.len());
    for kind in StepKind::CORE {
      assert!(lesson.has_kind(kind), "missing {kind:?}");
    }
  }

  #[test]
  fn every_core_subset_is_completed() {
    let all = [mc(), fb(), tf(), matching()];
    for mask in 0u8..16 {
      let steps: Vec<StepDraft> =
        all.iter().enumerate().filter(|(i, _)| mask & (1 << i) != 0).map(|(_, s)| s.clone()).collect();
      let lesson = LessonDraft { number: 1, title: "Halves".into(), theory: "t".into(), steps, ..Default::default() };
      assert_invariants(&normalize(lesson, &ctx()));
    }
  }

  #[test]
  fn authored_steps_are_kept_in_order() {
    let steps = vec![theory(), tf(), theory(), mc(), theory(), theory()];
    let lesson = LessonDraft { number: 2, title: "T".into(), theory: "x".into(), steps: steps.clone(), ..Default::default() };
    let out = normalize(lesson, &ctx());
    assert_eq!(&out.steps[..steps.len()], &steps[..]);
    assert_eq!(out.steps.len(), steps.len() + 2);
    assert_invariants(&out);
  }

  #[test]
  fn empty_lesson_gets_defaults() {
    let out = normalize(LessonDraft { number: 3, ..Default::default() }, &ctx());
    assert_eq!(out.title, "Lesson 3: Fractions");
    assert!(out.theory.contains("Fractions"));
    assert_eq!(out.curriculum.as_ref().unwrap().framework, "Mathematics (en-US)");
    assert_eq!(out.steps.len(), 5);
    assert_invariants(&out);
  }

  #[test]
  fn complete_lesson_is_unchanged() {
    let lesson = LessonDraft {
      number: 1,
      title: "Halves".into(),
      theory: "A half is one of two equal parts.".into(),
      curriculum: Some(CurriculumAlignment { framework: "CCSS".into(), objectives: vec![] }),
      steps: vec![theory(), mc(), fb(), tf(), matching()],
    };
    assert_eq!(normalize(lesson.clone(), &ctx()), lesson);
  }

  #[test]
  fn normalization_is_deterministic() {
    let lesson = LessonDraft { number: 4, title: "Thirds".into(), steps: vec![tf()], ..Default::default() };
    assert_eq!(normalize(lesson.clone(), &ctx()), normalize(lesson, &ctx()));
  }

  #[test]
  fn gamified_courses_reward_synthesized_steps() {
    let c = NormalizeContext { default_xp: Some(10), ..ctx() };
    let out = normalize(LessonDraft { number: 1, title: "T".into(), ..Default::default() }, &c);
    assert!(out.steps.iter().all(|s| s.xp == Some(10)));
  }
}
