//! In-memory Content Store and Usage Ledger.
//!
//! Both are process-local and reset on restart. They give the HTTP layer and
//! the tests real collaborators to write through; a deployment backed by a
//! database swaps them for implementations of the same traits.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::QuotaSettings;
use crate::domain::{CourseDraft, GradingReport, LessonDraft};
use crate::error::StoreError;
use crate::ports::{ContentStore, Reservation, UsageAction, UsageLedger};

#[derive(Default)]
pub struct InMemoryContentStore {
    courses: RwLock<HashMap<Uuid, CourseDraft>>,
    reports: RwLock<HashMap<String, GradingReport>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Course as currently stored, including lessons saved one at a time.
    pub async fn course(&self, id: Uuid) -> Option<CourseDraft> {
        self.courses.read().await.get(&id).cloned()
    }

    pub async fn report(&self, attempt_id: &str) -> Option<GradingReport> {
        self.reports.read().await.get(attempt_id).cloned()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    #[instrument(level = "debug", skip(self, course), fields(lessons = course.lessons.len()))]
    async fn save_course(&self, course: &CourseDraft) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.courses.write().await.insert(id, course.clone());
        info!(target: "lessonforge_backend", course_id = %id, lessons = course.lessons.len(), "Saved course");
        Ok(id)
    }

    /// Replaces any stored lesson with the same number, otherwise appends in number order.
    #[instrument(level = "debug", skip(self, lesson), fields(%course_id, number = lesson.number))]
    async fn save_lesson(&self, course_id: Uuid, lesson: &LessonDraft) -> Result<Uuid, StoreError> {
        let mut courses = self.courses.write().await;
        let course = courses
            .get_mut(&course_id)
            .ok_or_else(|| StoreError::NotFound(format!("course {course_id}")))?;

        match course.lessons.iter_mut().find(|l| l.number == lesson.number) {
            Some(existing) => *existing = lesson.clone(),
            None => {
                course.lessons.push(lesson.clone());
                course.lessons.sort_by_key(|l| l.number);
            }
        }

        let id = Uuid::new_v4();
        debug!(target: "lessonforge_backend", %course_id, lesson_id = %id, "Saved lesson");
        Ok(id)
    }

    async fn save_grading_report(&self, attempt_id: &str, report: &GradingReport) -> Result<(), StoreError> {
        if attempt_id.trim().is_empty() {
            return Err(StoreError::Unexpected("attempt id is empty".into()));
        }
        self.reports.write().await.insert(attempt_id.to_string(), report.clone());
        debug!(target: "lessonforge_backend", %attempt_id, "Saved grading report");
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Usage {
    used: u32,
    reserved: u32,
}

/// Per-account quota counter. A reservation holds a slot until it is
/// committed (the operation succeeded) or released (it failed).
pub struct InMemoryUsageLedger {
    quotas: QuotaSettings,
    usage: RwLock<HashMap<(String, UsageAction), Usage>>,
}

impl InMemoryUsageLedger {
    pub fn new(quotas: QuotaSettings) -> Self {
        Self { quotas, usage: RwLock::new(HashMap::new()) }
    }

    fn limit(&self, action: UsageAction) -> u32 {
        match action {
            UsageAction::CourseCreation => self.quotas.course_creation,
            UsageAction::LessonGeneration => self.quotas.lesson_generation,
        }
    }

    pub async fn used(&self, account_id: &str, action: UsageAction) -> u32 {
        self.usage
            .read()
            .await
            .get(&(account_id.to_string(), action))
            .map(|u| u.used)
            .unwrap_or(0)
    }
}

#[async_trait]
impl UsageLedger for InMemoryUsageLedger {
    async fn check_and_reserve(&self, account_id: &str, action: UsageAction) -> Reservation {
        let limit = self.limit(action);
        let mut usage = self.usage.write().await;
        let entry = usage.entry((account_id.to_string(), action)).or_default();
        if entry.used + entry.reserved >= limit {
            warn!(target: "lessonforge_backend", %account_id, ?action, used = entry.used, limit, "Quota exhausted");
            return Reservation::Denied;
        }
        entry.reserved += 1;
        Reservation::Allowed
    }

    async fn commit(&self, account_id: &str, action: UsageAction) {
        let mut usage = self.usage.write().await;
        let entry = usage.entry((account_id.to_string(), action)).or_default();
        entry.reserved = entry.reserved.saturating_sub(1);
        entry.used += 1;
        debug!(target: "lessonforge_backend", %account_id, ?action, used = entry.used, "Usage committed");
    }

    async fn release(&self, account_id: &str, action: UsageAction) {
        let mut usage = self.usage.write().await;
        if let Some(entry) = usage.get_mut(&(account_id.to_string(), action)) {
            entry.reserved = entry.reserved.saturating_sub(1);
        }
    }
}
