//! Error types for the pipeline: gateway failures, sanitizer failures,
//! generation failures (with the hint shown to users) and store failures.

use std::time::Duration;

/// Failure reported by the LLM gateway.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
  #[error("transient gateway failure: {0}")]
  Transient(String),
  #[error("gateway call timed out after {0:?}")]
  Timeout(Duration),
  /// Quota exhaustion, auth failure, bad request. Never retried.
  #[error("terminal gateway failure: {0}")]
  Terminal(String),
}

impl GatewayError {
  pub fn is_transient(&self) -> bool {
    !matches!(self, GatewayError::Terminal(_))
  }
}

/// Why raw model text could not be turned into structured data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SanitizeError {
  #[error("response was empty")]
  Empty,
  #[error("truncated output: {open} opening vs {close} closing delimiters")]
  Truncated { open: usize, close: usize },
  #[error("truncated output: string literal never closed")]
  UnterminatedString,
  #[error("malformed structured output: {0}")]
  Malformed(String),
}

impl SanitizeError {
  /// True when the text looks cut off mid-generation rather than merely malformed.
  pub fn is_truncation(&self) -> bool {
    matches!(self, SanitizeError::Truncated { .. } | SanitizeError::UnterminatedString)
  }
}

/// Classification of a single failed attempt; the last one is kept for reporting.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
  Gateway(String),
  Timeout(String),
  Truncated(String),
  Malformed(String),
  /// Parsed fine but carried fewer lessons than requested.
  Incomplete(String),
}

impl AttemptFailure {
  pub fn from_sanitize(e: &SanitizeError) -> Self {
    if e.is_truncation() {
      AttemptFailure::Truncated(e.to_string())
    } else {
      AttemptFailure::Malformed(e.to_string())
    }
  }

  /// Truncation and short responses point at an oversized request.
  pub fn suggests_smaller_scope(&self) -> bool {
    matches!(self, AttemptFailure::Truncated(_) | AttemptFailure::Incomplete(_))
  }
}

impl std::fmt::Display for AttemptFailure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      AttemptFailure::Gateway(m)
      | AttemptFailure::Timeout(m)
      | AttemptFailure::Truncated(m)
      | AttemptFailure::Malformed(m)
      | AttemptFailure::Incomplete(m) => f.write_str(m),
    }
  }
}

/// What the user should do about a failed generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationHint {
  TryAgain,
  ReduceScope,
  ContactSupport,
}

impl GenerationHint {
  pub fn message(&self) -> &'static str {
    match self {
      GenerationHint::TryAgain => "The content service is busy or unreachable. Please try again in a moment.",
      GenerationHint::ReduceScope => "The generated course was cut off. Try requesting fewer lessons.",
      GenerationHint::ContactSupport => "Content generation is unavailable for this account right now.",
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
  #[error("{unit}: terminal failure: {reason}")]
  Terminal { unit: String, reason: String },

  #[error("{unit}: gave up after {attempts} attempts ({lessons_completed} lessons completed): {last}")]
  RetriesExhausted {
    unit: String,
    attempts: u32,
    last: AttemptFailure,
    lessons_completed: usize,
  },

  #[error("invalid generation request: {0}")]
  InvalidRequest(String),

  #[error("content store error: {0}")]
  Store(#[from] StoreError),
}

impl GenerationError {
  pub fn hint(&self) -> GenerationHint {
    match self {
      GenerationError::RetriesExhausted { last, .. } if last.suggests_smaller_scope() => {
        GenerationHint::ReduceScope
      }
      GenerationError::RetriesExhausted { .. } | GenerationError::Store(_) => GenerationHint::TryAgain,
      GenerationError::InvalidRequest(_) => GenerationHint::ReduceScope,
      GenerationError::Terminal { .. } => GenerationHint::ContactSupport,
    }
  }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
  #[error("not found: {0}")]
  NotFound(String),
  #[error("unexpected store error: {0}")]
  Unexpected(String),
}
