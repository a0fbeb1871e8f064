//! Generation Orchestrator: drives the LLM gateway to produce a complete course.
//!
//! Flow per course:
//!   plan chunks -> for each chunk (sequentially): prompt -> gateway (timeout,
//!   retry with backoff) -> sanitize -> parse -> renumber -> duplicate check
//!   -> normalize every lesson -> persist through the content store.
//!
//! Also hosts outline-only generation and the sequential per-lesson variant.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{PipelineSettings, Prompts};
use crate::content::{parse_course, parse_lesson, parse_outline, ParsedCourse};
use crate::domain::{CourseDraft, CourseOutline, GenerationChunk, GenerationRequest, LessonDraft};
use crate::duplicate::find_duplicates;
use crate::error::{AttemptFailure, GatewayError, GenerationError};
use crate::normalize::{normalize, NormalizeContext};
use crate::ports::{ContentStore, LlmGateway};
use crate::prompt::{build_course_prompt, build_lesson_prompt, build_outline_prompt, PromptConfig};
use crate::sanitize::sanitize;

/// XP given to steps the normalizer synthesizes in gamified courses.
const SYNTHESIZED_STEP_XP: u32 = 10;

/// Split a request into contiguous chunks. Counts up to `threshold` stay whole;
/// larger ones become two chunks, the first taking `ceil(count / 2)` lessons.
pub fn plan_chunks(req: &GenerationRequest, threshold: u32) -> Vec<GenerationChunk> {
  let n = req.lesson_count;
  if n <= threshold.max(1) {
    return vec![GenerationChunk::whole(req)];
  }
  let first = n.div_ceil(2);
  vec![
    GenerationChunk {
      request: req.clone(),
      index: 0,
      total: 2,
      first_lesson: 1,
      last_lesson: first,
      covered_summary: None,
    },
    GenerationChunk {
      request: req.clone(),
      index: 1,
      total: 2,
      first_lesson: first + 1,
      last_lesson: n,
      covered_summary: None,
    },
  ]
}

/// A persisted course and the draft that was written.
#[derive(Clone, Debug)]
pub struct GeneratedCourse {
  pub course_id: Uuid,
  pub draft: CourseDraft,
}

#[derive(Clone)]
pub struct CourseGenerator {
  gateway: Arc<dyn LlmGateway>,
  store: Arc<dyn ContentStore>,
  prompts: Prompts,
  settings: PipelineSettings,
}

impl CourseGenerator {
  pub fn new(
    gateway: Arc<dyn LlmGateway>,
    store: Arc<dyn ContentStore>,
    prompts: Prompts,
    settings: PipelineSettings,
  ) -> Self {
    Self { gateway, store, prompts, settings }
  }

  /// Generate, normalize and persist a full course.
  #[instrument(
    level = "info",
    skip(self, req),
    fields(lesson_count = req.lesson_count, level = req.level, topic_len = req.topic.len())
  )]
  pub async fn generate_course(&self, req: &GenerationRequest) -> Result<GeneratedCourse, GenerationError> {
    validate(req, &self.settings)?;
    let chunks = plan_chunks(req, self.settings.chunk_threshold);
    info!(target: "generation", chunks = chunks.len(), lessons = req.lesson_count, "Planned course generation");

    let mut title = String::new();
    let mut description = String::new();
    let mut lessons: Vec<LessonDraft> = Vec::new();
    let mut duplicate_warnings = Vec::new();

    // Strictly sequential: the second chunk's prompt lists the first chunk's titles.
    for mut chunk in chunks {
      if chunk.index > 0 {
        let covered: Vec<&str> =
          lessons.iter().map(|l| l.title.trim()).filter(|t| !t.is_empty()).collect();
        chunk.covered_summary = Some(covered.join("; "));
      }

      let parsed = self.generate_chunk(&chunk, lessons.len()).await?;

      if chunk.index > 0 {
        let first_titles: Vec<String> = lessons.iter().map(|l| l.title.clone()).collect();
        let dups = find_duplicates(&first_titles, &parsed.lessons, self.settings.duplicate_threshold);
        if !dups.is_empty() {
          warn!(target: "generation", %chunk, duplicates = ?dups, "Second chunk repeats earlier lesson titles");
          duplicate_warnings.extend(dups);
        }
      }
      if title.is_empty() {
        title = parsed.title;
      }
      if description.is_empty() {
        description = parsed.description;
      }
      lessons.extend(parsed.lessons);
    }

    let ctx = self.normalize_context(req);
    let lessons: Vec<LessonDraft> = lessons.into_iter().map(|l| normalize(l, &ctx)).collect();

    let draft = CourseDraft {
      title: if title.is_empty() { format!("{}: {}", req.subject, req.topic) } else { title },
      description: if description.is_empty() {
        format!("A {}-lesson {} course on {} ({}).", req.lesson_count, req.difficulty.as_str(), req.topic, req.level_label())
      } else {
        description
      },
      lessons,
      duplicate_warnings,
    };

    let course_id = self.store.save_course(&draft).await?;
    info!(
      target: "generation",
      %course_id,
      lessons = draft.lessons.len(),
      duplicates = draft.duplicate_warnings.len(),
      "Course generated"
    );
    Ok(GeneratedCourse { course_id, draft })
  }

  /// One chunk: exactly `chunk.lesson_count()` lessons numbered from `chunk.first_lesson`.
  async fn generate_chunk(&self, chunk: &GenerationChunk, completed: usize) -> Result<ParsedCourse, GenerationError> {
    let prompt = build_course_prompt(&self.prompts, &self.settings, chunk);
    let expected = chunk.lesson_count() as usize;
    let first = chunk.first_lesson;

    self
      .call_with_retry(&chunk.to_string(), &prompt, self.settings.lesson_timeout(), completed, |value| {
        let mut parsed = parse_course(&value).map_err(AttemptFailure::Malformed)?;
        if parsed.lessons.len() < expected {
          return Err(AttemptFailure::Incomplete(format!(
            "expected {expected} lessons, got {}",
            parsed.lessons.len()
          )));
        }
        if parsed.lessons.len() > expected {
          debug!(target: "generation", extra = parsed.lessons.len() - expected, "Dropping lessons beyond the chunk range");
          parsed.lessons.truncate(expected);
        }
        // Model-provided numbers are not trusted; position decides.
        for (i, lesson) in parsed.lessons.iter_mut().enumerate() {
          lesson.number = first + i as u32;
        }
        Ok(parsed)
      })
      .await
  }

  /// Titles and summaries only, renumbered 1..=lesson_count.
  #[instrument(level = "info", skip(self, req), fields(lesson_count = req.lesson_count))]
  pub async fn generate_outline(&self, req: &GenerationRequest) -> Result<CourseOutline, GenerationError> {
    validate(req, &self.settings)?;
    let prompt = build_outline_prompt(&self.prompts, &self.settings, req);
    let expected = req.lesson_count as usize;

    let mut outline = self
      .call_with_retry("outline", &prompt, self.settings.outline_timeout(), 0, |value| {
        let mut outline = parse_outline(&value).map_err(AttemptFailure::Malformed)?;
        if outline.lessons.len() < expected {
          return Err(AttemptFailure::Incomplete(format!(
            "expected {expected} outline entries, got {}",
            outline.lessons.len()
          )));
        }
        outline.lessons.truncate(expected);
        Ok(outline)
      })
      .await?;

    if outline.title.is_empty() {
      outline.title = format!("{}: {}", req.subject, req.topic);
    }
    info!(target: "generation", entries = outline.lessons.len(), "Outline generated");
    Ok(outline)
  }

  /// One gateway call per outline entry, strictly sequential with a fixed
  /// delay between calls. Each lesson is saved as soon as it is ready; the
  /// first lesson that exhausts its retries stops the run.
  #[instrument(level = "info", skip(self, req, outline), fields(%course_id, entries = outline.lessons.len()))]
  pub async fn generate_lessons_individually(
    &self,
    course_id: Uuid,
    req: &GenerationRequest,
    outline: &CourseOutline,
  ) -> Result<Vec<Uuid>, GenerationError> {
    validate(req, &self.settings)?;
    if outline.lessons.is_empty() {
      return Err(GenerationError::InvalidRequest("outline has no lessons".into()));
    }
    if outline.lessons.len() > self.settings.max_lessons_per_course as usize {
      return Err(GenerationError::InvalidRequest(format!(
        "outline has {} lessons, the limit is {}",
        outline.lessons.len(),
        self.settings.max_lessons_per_course
      )));
    }
    let ctx = self.normalize_context(req);
    let delay = self.settings.inter_lesson_delay();
    let mut saved = Vec::with_capacity(outline.lessons.len());

    // Outline numbers may come from the caller; position decides, as for chunks.
    let outline = outline.clone().renumbered();
    for (i, entry) in outline.lessons.iter().enumerate() {
      if i > 0 && !delay.is_zero() {
        tokio::time::sleep(delay).await;
      }
      let prompt = build_lesson_prompt(&self.prompts, &self.settings, req, &outline.title, entry);
      let unit = format!("lesson {}", entry.number);

      let lesson = self
        .call_with_retry(&unit, &prompt, self.settings.lesson_timeout(), saved.len(), |value| {
          // Some models still wrap a single lesson in a course envelope.
          let value = match value.get("lessons").and_then(|l| l.get(0)) {
            Some(first) => first.clone(),
            None => value,
          };
          let mut lesson = parse_lesson(&value)
            .ok_or_else(|| AttemptFailure::Malformed("lesson response is not an object".into()))?;
          lesson.number = entry.number;
          if lesson.title.is_empty() {
            lesson.title = entry.title.clone();
          }
          Ok(lesson)
        })
        .await?;

      let lesson = normalize(lesson, &ctx);
      let lesson_id = self.store.save_lesson(course_id, &lesson).await?;
      debug!(target: "generation", %course_id, %lesson_id, number = lesson.number, "Lesson saved");
      saved.push(lesson_id);
    }

    info!(target: "generation", %course_id, saved = saved.len(), "Per-lesson generation complete");
    Ok(saved)
  }

  fn normalize_context<'a>(&self, req: &'a GenerationRequest) -> NormalizeContext<'a> {
    NormalizeContext {
      subject: &req.subject,
      topic: &req.topic,
      locale: &req.locale,
      min_steps: self.settings.min_steps_per_lesson,
      default_xp: req.gamification.then_some(SYNTHESIZED_STEP_XP),
    }
  }

  /// Runs one unit of work under the retry policy. Transient gateway
  /// failures, timeouts and sanitize/parse/shape failures all consume the
  /// same attempt budget; terminal gateway failures return immediately.
  async fn call_with_retry<T, F>(
    &self,
    unit: &str,
    prompt: &PromptConfig,
    timeout: Duration,
    lessons_completed: usize,
    mut accept: F,
  ) -> Result<T, GenerationError>
  where
    F: FnMut(Value) -> Result<T, AttemptFailure>,
  {
    let attempts = self.settings.max_retries + 1;
    let mut last = AttemptFailure::Gateway("no attempt made".into());

    for attempt in 0..attempts {
      let outcome = match tokio::time::timeout(timeout, self.gateway.complete(prompt, timeout)).await {
        Err(_) => Err(AttemptFailure::Timeout(format!("no response within {timeout:?}"))),
        Ok(Err(GatewayError::Terminal(reason))) => {
          warn!(target: "generation", %unit, attempt, %reason, "Terminal gateway failure; not retrying");
          return Err(GenerationError::Terminal { unit: unit.to_string(), reason });
        }
        Ok(Err(e @ GatewayError::Timeout(_))) => Err(AttemptFailure::Timeout(e.to_string())),
        Ok(Err(GatewayError::Transient(m))) => Err(AttemptFailure::Gateway(m)),
        Ok(Ok(raw)) => match sanitize(&raw) {
          Ok(s) => {
            debug!(target: "generation", %unit, attempt, raw_len = raw.len(), clean_len = s.text.len(), "Response sanitized");
            accept(s.value)
          }
          Err(e) => Err(AttemptFailure::from_sanitize(&e)),
        },
      };

      match outcome {
        Ok(value) => {
          if attempt > 0 {
            info!(target: "generation", %unit, attempt, "Succeeded after retry");
          }
          return Ok(value);
        }
        Err(failure) => {
          last = failure;
          if attempt + 1 < attempts {
            let delay = self.backoff_delay(attempt);
            warn!(
              target: "generation",
              %unit,
              attempt,
              delay_ms = delay.as_millis() as u64,
              error = %last,
              "Attempt failed; retrying"
            );
            if !delay.is_zero() {
              tokio::time::sleep(delay).await;
            }
          }
        }
      }
    }

    warn!(target: "generation", %unit, attempts, error = %last, "Retries exhausted");
    Err(GenerationError::RetriesExhausted { unit: unit.to_string(), attempts, last, lessons_completed })
  }

  /// base * 2^attempt, plus up to `backoff_jitter_ms` of random jitter.
  fn backoff_delay(&self, attempt: u32) -> Duration {
    let base = self.settings.backoff_base_ms.saturating_mul(1u64 << attempt.min(16));
    let jitter = match self.settings.backoff_jitter_ms {
      0 => 0,
      max => rand::thread_rng().gen_range(0..=max),
    };
    Duration::from_millis(base.saturating_add(jitter))
  }
}

fn validate(req: &GenerationRequest, settings: &PipelineSettings) -> Result<(), GenerationError> {
  if req.lesson_count == 0 {
    return Err(GenerationError::InvalidRequest("lesson count must be at least 1".into()));
  }
  if req.lesson_count > settings.max_lessons_per_course {
    return Err(GenerationError::InvalidRequest(format!(
      "lesson count {} exceeds the limit of {}",
      req.lesson_count, settings.max_lessons_per_course
    )));
  }
  if req.subject.trim().is_empty() || req.topic.trim().is_empty() {
    return Err(GenerationError::InvalidRequest("subject and topic are required".into()));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Difficulty, StepKind};
  use crate::error::GenerationHint;
  use crate::ports::testing::ScriptedGateway;
  use crate::store::InMemoryContentStore;
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn request(count: u32) -> GenerationRequest {
    GenerationRequest {
      subject: "Science".into(),
      level: 6,
      topic: "Photosynthesis".into(),
      difficulty: Difficulty::Medium,
      lesson_count: count,
      locale: "en-US".into(),
      gamification: false,
    }
  }

  fn fast_settings() -> PipelineSettings {
    PipelineSettings { backoff_base_ms: 0, inter_lesson_delay_ms: 0, ..PipelineSettings::default() }
  }

  fn generator(gateway: Arc<ScriptedGateway>, store: Arc<InMemoryContentStore>) -> CourseGenerator {
    CourseGenerator::new(gateway, store, Prompts::default(), fast_settings())
  }

  /// A response with the given lesson titles; the model numbers them from 1 regardless of chunk.
  fn course_json(titles: &[&str]) -> String {
    let lessons: Vec<Value> = titles
      .iter()
      .enumerate()
      .map(|(i, t)| {
        json!({
          "number": i + 1,
          "title": t,
          "theory": format!("About {t}"),
          "steps": [{"type": "true_false", "statement": format!("{t} matters"), "answer": true}]
        })
      })
      .collect();
    format!("```json\n{}\n```", json!({"title": "Plants and Light", "description": "How plants eat", "lessons": lessons}))
  }

  #[test]
  fn small_requests_stay_in_one_chunk() {
    for n in 1..=6 {
      let chunks = plan_chunks(&request(n), 6);
      assert_eq!(chunks.len(), 1);
      assert_eq!((chunks[0].first_lesson, chunks[0].last_lesson), (1, n));
    }
  }

  #[test]
  fn large_requests_split_into_disjoint_contiguous_halves() {
    for n in 7..=40 {
      let chunks = plan_chunks(&request(n), 6);
      assert_eq!(chunks.len(), 2);
      assert_eq!(chunks[0].first_lesson, 1);
      assert_eq!(chunks[0].last_lesson, n.div_ceil(2));
      assert_eq!(chunks[1].first_lesson, chunks[0].last_lesson + 1);
      assert_eq!(chunks[1].last_lesson, n);
      assert_eq!(chunks[0].lesson_count() + chunks[1].lesson_count(), n);
    }
  }

  #[tokio::test]
  async fn small_course_uses_exactly_one_call() {
    let gw = Arc::new(ScriptedGateway::new(vec![Ok(course_json(&["Light", "Chlorophyll", "Glucose"]))]));
    let store = Arc::new(InMemoryContentStore::new());
    let out = generator(gw.clone(), store.clone()).generate_course(&request(3)).await.unwrap();

    assert_eq!(gw.calls(), 1);
    assert_eq!(out.draft.title, "Plants and Light");
    let numbers: Vec<u32> = out.draft.lessons.iter().map(|l| l.number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    for lesson in &out.draft.lessons {
      assert!(lesson.steps.len() >= 5);
      assert!(StepKind::CORE.iter().all(|k| lesson.has_kind(*k)));
    }
    assert_eq!(store.course(out.course_id).await.unwrap(), out.draft);
  }

  #[tokio::test]
  async fn split_course_is_renumbered_and_second_prompt_lists_covered_titles() {
    let gw = Arc::new(ScriptedGateway::new(vec![
      Ok(course_json(&["Light", "Chlorophyll", "Glucose", "Stomata"])),
      Ok(course_json(&["Water transport", "Night cycle", "Seasons", "Experiments"])),
    ]));
    let store = Arc::new(InMemoryContentStore::new());
    let out = generator(gw.clone(), store).generate_course(&request(8)).await.unwrap();

    assert_eq!(gw.calls(), 2);
    let numbers: Vec<u32> = out.draft.lessons.iter().map(|l| l.number).collect();
    assert_eq!(numbers, (1..=8).collect::<Vec<_>>());
    assert_eq!(out.draft.lessons[4].title, "Water transport");
    assert!(out.draft.duplicate_warnings.is_empty());

    let prompts = gw.prompts();
    assert!(!prompts[0].user.contains("Do NOT repeat"));
    assert!(prompts[1].user.contains("Light; Chlorophyll; Glucose; Stomata"));
    assert!(prompts[1].user.contains("lessons 5 to 8"));
  }

  #[tokio::test]
  async fn repeated_titles_are_reported_but_kept() {
    let gw = Arc::new(ScriptedGateway::new(vec![
      Ok(course_json(&["Light", "Chlorophyll", "Glucose", "Stomata"])),
      Ok(course_json(&["CHLOROPHYLL", "Night cycle", "Seasons"])),
    ]));
    let store = Arc::new(InMemoryContentStore::new());
    let out = generator(gw, store).generate_course(&request(7)).await.unwrap();
    assert_eq!(out.draft.lessons.len(), 7);
    assert_eq!(out.draft.duplicate_warnings, vec!["CHLOROPHYLL".to_string()]);
  }

  #[tokio::test]
  async fn truncated_output_is_retried() {
    let gw = Arc::new(ScriptedGateway::new(vec![
      Ok("{\"lessons\": [{\"title\": \"Light\"}, {\"title\": \"Chlo".into()),
      Ok(course_json(&["Light", "Chlorophyll"])),
    ]));
    let store = Arc::new(InMemoryContentStore::new());
    let out = generator(gw.clone(), store).generate_course(&request(2)).await.unwrap();
    assert_eq!(gw.calls(), 2);
    assert_eq!(out.draft.lessons.len(), 2);
  }

  #[tokio::test]
  async fn transient_failures_and_short_responses_share_the_attempt_budget() {
    let gw = Arc::new(ScriptedGateway::new(vec![
      Err(GatewayError::Timeout(Duration::from_secs(180))),
      Ok(course_json(&["Light"])),
      Ok(course_json(&["Light", "Chlorophyll"])),
    ]));
    let store = Arc::new(InMemoryContentStore::new());
    let out = generator(gw.clone(), store).generate_course(&request(2)).await.unwrap();
    assert_eq!(gw.calls(), 3);
    assert_eq!(out.draft.lessons.len(), 2);
  }

  #[tokio::test]
  async fn terminal_gateway_failure_is_not_retried() {
    let gw = Arc::new(ScriptedGateway::new(vec![Err(GatewayError::Terminal("insufficient_quota".into()))]));
    let store = Arc::new(InMemoryContentStore::new());
    let err = generator(gw.clone(), store).generate_course(&request(3)).await.unwrap_err();
    assert_eq!(gw.calls(), 1);
    assert!(matches!(err, GenerationError::Terminal { .. }));
    assert_eq!(err.hint(), GenerationHint::ContactSupport);
  }

  #[tokio::test]
  async fn exhausted_second_chunk_names_the_chunk_and_suggests_fewer_lessons() {
    let cut = "{\"lessons\": [{\"title\": \"Wat";
    let gw = Arc::new(ScriptedGateway::new(vec![
      Ok(course_json(&["Light", "Chlorophyll", "Glucose", "Stomata"])),
      Ok(cut.into()),
      Ok(cut.into()),
      Ok(cut.into()),
    ]));
    let store = Arc::new(InMemoryContentStore::new());
    let err = generator(gw.clone(), store).generate_course(&request(8)).await.unwrap_err();

    assert_eq!(gw.calls(), 4);
    match &err {
      GenerationError::RetriesExhausted { unit, attempts, lessons_completed, .. } => {
        assert_eq!(unit, "chunk 2/2 (lessons 5-8)");
        assert_eq!(*attempts, 3);
        assert_eq!(*lessons_completed, 4);
      }
      other => panic!("unexpected {other:?}"),
    }
    assert_eq!(err.hint(), GenerationHint::ReduceScope);
  }

  #[tokio::test]
  async fn invalid_requests_never_reach_the_gateway() {
    let gw = Arc::new(ScriptedGateway::new(vec![]));
    let store = Arc::new(InMemoryContentStore::new());
    let err = generator(gw.clone(), store).generate_course(&request(0)).await.unwrap_err();
    assert!(matches!(err, GenerationError::InvalidRequest(_)));
    assert_eq!(gw.calls(), 0);
  }

  #[tokio::test]
  async fn oversized_lesson_count_is_rejected_before_any_call() {
    let gw = Arc::new(ScriptedGateway::new(vec![]));
    let store = Arc::new(InMemoryContentStore::new());
    let pipeline = generator(gw.clone(), store);

    let err = pipeline.generate_course(&request(u32::MAX)).await.unwrap_err();
    assert!(matches!(err, GenerationError::InvalidRequest(ref m) if m.contains("exceeds")));
    let err = pipeline.generate_outline(&request(41)).await.unwrap_err();
    assert!(matches!(err, GenerationError::InvalidRequest(_)));
    assert_eq!(gw.calls(), 0);
  }

  #[test]
  fn backoff_doubles_from_the_base_delay() {
    let gw = Arc::new(ScriptedGateway::new(vec![]));
    let pipeline = CourseGenerator::new(gw, Arc::new(InMemoryContentStore::new()), Prompts::default(), PipelineSettings::default());
    assert_eq!(pipeline.backoff_delay(0), Duration::from_secs(1));
    assert_eq!(pipeline.backoff_delay(1), Duration::from_secs(2));
    assert_eq!(pipeline.backoff_delay(2), Duration::from_secs(4));
  }

  /// Accepts every call and never answers.
  struct SilentGateway {
    calls: AtomicU32,
  }

  #[async_trait::async_trait]
  impl LlmGateway for SilentGateway {
    async fn complete(&self, _prompt: &PromptConfig, _timeout: Duration) -> Result<String, GatewayError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      std::future::pending::<Result<String, GatewayError>>().await
    }
  }

  #[tokio::test(start_paused = true)]
  async fn hung_gateway_times_out_on_every_attempt() {
    let gw = Arc::new(SilentGateway { calls: AtomicU32::new(0) });
    let pipeline = CourseGenerator::new(
      gw.clone(),
      Arc::new(InMemoryContentStore::new()),
      Prompts::default(),
      PipelineSettings::default(),
    );

    let err = pipeline.generate_course(&request(2)).await.unwrap_err();
    assert_eq!(gw.calls.load(Ordering::SeqCst), 3);
    match err {
      GenerationError::RetriesExhausted { attempts, last, .. } => {
        assert_eq!(attempts, 3);
        assert!(matches!(last, AttemptFailure::Timeout(_)));
      }
      other => panic!("unexpected {other:?}"),
    }
  }

  #[tokio::test]
  async fn gamified_courses_reward_synthesized_steps() {
    let gw = Arc::new(ScriptedGateway::new(vec![Ok(course_json(&["Light"]))]));
    let store = Arc::new(InMemoryContentStore::new());
    let mut req = request(1);
    req.gamification = true;
    let out = generator(gw, store).generate_course(&req).await.unwrap();
    let synthesized = &out.draft.lessons[0].steps[1..];
    assert!(synthesized.iter().all(|s| s.xp == Some(SYNTHESIZED_STEP_XP)));
  }

  #[tokio::test]
  async fn outline_is_renumbered_and_must_be_complete() {
    let short = json!({"title": "Plants", "lessons": [{"title": "Light"}]}).to_string();
    let full = json!({"title": "Plants", "lessons": [
      {"number": 3, "title": "Light", "summary": "Sunlight"},
      {"number": 9, "title": "Leaves", "summary": "Structure"},
      {"title": "Extra"}
    ]})
    .to_string();
    let gw = Arc::new(ScriptedGateway::new(vec![Ok(short), Ok(full)]));
    let store = Arc::new(InMemoryContentStore::new());
    let outline = generator(gw.clone(), store).generate_outline(&request(2)).await.unwrap();

    assert_eq!(gw.calls(), 2);
    assert_eq!(outline.lessons.len(), 2);
    assert_eq!(outline.lessons[1].number, 2);
    assert_eq!(outline.lessons[1].title, "Leaves");
  }

  fn outline(titles: &[&str]) -> CourseOutline {
    CourseOutline {
      title: "Plants".into(),
      description: String::new(),
      lessons: titles
        .iter()
        .enumerate()
        .map(|(i, t)| crate::domain::OutlineEntry { number: i as u32 + 1, title: t.to_string(), summary: String::new() })
        .collect(),
    }
  }

  #[tokio::test]
  async fn lessons_are_generated_and_saved_one_at_a_time() {
    let gw = Arc::new(ScriptedGateway::new(vec![
      Ok(json!({"title": "Light", "theory": "Sun", "steps": []}).to_string()),
      Ok(json!({"lesson": {"theory": "Green"}}).to_string()),
    ]));
    let store = Arc::new(InMemoryContentStore::new());
    let course_id = store.save_course(&CourseDraft { title: "Plants".into(), ..Default::default() }).await.unwrap();

    let ids = generator(gw.clone(), store.clone())
      .generate_lessons_individually(course_id, &request(2), &outline(&["Light", "Leaves"]))
      .await
      .unwrap();

    assert_eq!(ids.len(), 2);
    assert_eq!(gw.calls(), 2);
    let course = store.course(course_id).await.unwrap();
    assert_eq!(course.lessons[1].title, "Leaves");
    assert_eq!(course.lessons[1].number, 2);
    assert!(course.lessons.iter().all(|l| l.steps.len() >= 5));
  }

  #[tokio::test]
  async fn failed_lesson_stops_the_run_and_reports_progress() {
    let cut = "{\"title\": \"Lea";
    let gw = Arc::new(ScriptedGateway::new(vec![
      Ok(json!({"title": "Light"}).to_string()),
      Ok(cut.into()),
      Ok(cut.into()),
      Ok(cut.into()),
    ]));
    let store = Arc::new(InMemoryContentStore::new());
    let course_id = store.save_course(&CourseDraft::default()).await.unwrap();

    let err = generator(gw.clone(), store.clone())
      .generate_lessons_individually(course_id, &request(3), &outline(&["Light", "Leaves", "Roots"]))
      .await
      .unwrap_err();

    assert_eq!(gw.calls(), 4);
    match err {
      GenerationError::RetriesExhausted { unit, lessons_completed, .. } => {
        assert_eq!(unit, "lesson 2");
        assert_eq!(lessons_completed, 1);
      }
      other => panic!("unexpected {other:?}"),
    }
    assert_eq!(store.course(course_id).await.unwrap().lessons.len(), 1);
  }

  #[tokio::test]
  async fn caller_outline_numbers_never_overwrite_saved_lessons() {
    let gw = Arc::new(ScriptedGateway::new(vec![
      Ok(json!({"title": "A", "theory": "First"}).to_string()),
      Ok(json!({"title": "B", "theory": "Second"}).to_string()),
    ]));
    let store = Arc::new(InMemoryContentStore::new());
    let course_id = store.save_course(&CourseDraft::default()).await.unwrap();
    let mut repeated = outline(&["A", "B"]);
    for entry in &mut repeated.lessons {
      entry.number = 7;
    }

    let ids = generator(gw.clone(), store.clone())
      .generate_lessons_individually(course_id, &request(2), &repeated)
      .await
      .unwrap();

    assert_eq!(ids.len(), 2);
    let course = store.course(course_id).await.unwrap();
    let numbers: Vec<u32> = course.lessons.iter().map(|l| l.number).collect();
    let titles: Vec<&str> = course.lessons.iter().map(|l| l.title.as_str()).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(titles, vec!["A", "B"]);
  }

  #[tokio::test]
  async fn per_lesson_generation_checks_the_request_and_outline_size() {
    let gw = Arc::new(ScriptedGateway::new(vec![]));
    let store = Arc::new(InMemoryContentStore::new());
    let course_id = store.save_course(&CourseDraft::default()).await.unwrap();
    let pipeline = generator(gw.clone(), store);

    let err = pipeline.generate_lessons_individually(course_id, &request(0), &outline(&["A"])).await.unwrap_err();
    assert!(matches!(err, GenerationError::InvalidRequest(_)));

    let titles: Vec<String> = (0..41).map(|i| format!("Lesson {i}")).collect();
    let big = outline(&titles.iter().map(String::as_str).collect::<Vec<_>>());
    let err = pipeline.generate_lessons_individually(course_id, &request(2), &big).await.unwrap_err();
    assert!(matches!(err, GenerationError::InvalidRequest(_)));
    assert_eq!(gw.calls(), 0);
  }
}
