//! Service contracts for the external collaborators the pipeline talks to:
//! the LLM gateway, the content store and the usage ledger.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{CourseDraft, GradingReport, LessonDraft};
use crate::error::{GatewayError, StoreError};
use crate::prompt::PromptConfig;

#[async_trait]
pub trait LlmGateway: Send + Sync {
  /// Returns the raw completion text, or a typed transient/terminal failure.
  async fn complete(&self, prompt: &PromptConfig, timeout: Duration) -> Result<String, GatewayError>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
  async fn save_course(&self, course: &CourseDraft) -> Result<Uuid, StoreError>;

  async fn save_lesson(&self, course_id: Uuid, lesson: &LessonDraft) -> Result<Uuid, StoreError>;

  async fn save_grading_report(&self, attempt_id: &str, report: &GradingReport) -> Result<(), StoreError>;
}

/// Metered actions an account can perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UsageAction {
  CourseCreation,
  LessonGeneration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reservation {
  Allowed,
  Denied,
}

#[async_trait]
pub trait UsageLedger: Send + Sync {
  async fn check_and_reserve(&self, account_id: &str, action: UsageAction) -> Reservation;

  async fn commit(&self, account_id: &str, action: UsageAction);

  /// Drops a reservation whose operation failed.
  async fn release(&self, account_id: &str, action: UsageAction);
}

/// Gateway installed when no LLM provider is configured.
pub struct UnavailableGateway;

#[async_trait]
impl LlmGateway for UnavailableGateway {
  async fn complete(&self, _prompt: &PromptConfig, _timeout: Duration) -> Result<String, GatewayError> {
    Err(GatewayError::Terminal("LLM integration disabled".into()))
  }
}
