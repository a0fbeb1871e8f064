//! Duplicate Detector: flags second-chunk lesson titles that repeat a
//! first-chunk title, either exactly (case-insensitive) or by token overlap.
//!
//! Advisory only. Callers attach the result as a warning; removing a lesson
//! would break contiguous lesson numbering.

use crate::domain::LessonDraft;
use crate::util::word_set;

/// Share of `title`'s words that also appear in `candidate`.
pub fn overlap_ratio(title: &str, candidate: &str) -> f64 {
  let words = word_set(title);
  if words.is_empty() {
    return 0.0;
  }
  let other = word_set(candidate);
  let shared = words.intersection(&other).count();
  shared as f64 / words.len() as f64
}

/// Titles in `second` that duplicate some title in `first_titles`.
/// A title is a duplicate on an exact case-insensitive match or when its
/// overlap ratio with any first-chunk title is strictly above `threshold`.
pub fn find_duplicates(first_titles: &[String], second: &[LessonDraft], threshold: f64) -> Vec<String> {
  second
    .iter()
    .filter(|lesson| {
      let title = lesson.title.trim();
      if title.is_empty() {
        return false;
      }
      let lowered = title.to_lowercase();
      first_titles.iter().any(|candidate| {
        lowered == candidate.trim().to_lowercase() || overlap_ratio(title, candidate) > threshold
      })
    })
    .map(|lesson| lesson.title.clone())
    .collect()
}
