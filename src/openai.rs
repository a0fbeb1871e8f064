//! OpenAI-backed LLM gateway.
//!
//! We only call chat.completions, asking for a strict JSON object when the
//! prompt wants one. Calls are instrumented and log model names, latencies and
//! token usage (not contents). Provider failures are classified into the
//! gateway's transient/terminal taxonomy so the orchestrator knows what to retry.
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::GatewayError;
use crate::ports::LlmGateway;
use crate::prompt::PromptConfig;

#[derive(Clone)]
pub struct OpenAiGateway {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub model: String,
}

impl OpenAiGateway {
  /// Construct the gateway if we find OPENAI_API_KEY; otherwise return None.
  /// `model_var` names the env var holding the model, `default_model` applies when it is unset.
  pub fn from_env(model_var: &str, default_model: &str) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var(model_var).unwrap_or_else(|_| default_model.into());

    // Per-call timeouts come from the caller, so the client has none of its own.
    let client = reqwest::Client::builder().build().ok()?;

    Some(Self { client, api_key, base_url: base_url.trim_end_matches('/').to_string(), model })
  }
}

#[async_trait]
impl LlmGateway for OpenAiGateway {
  #[instrument(
    level = "info",
    skip(self, prompt),
    fields(model = %self.model, user_len = prompt.user.len(), max_tokens = prompt.max_output_tokens)
  )]
  async fn complete(&self, prompt: &PromptConfig, timeout: Duration) -> Result<String, GatewayError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: prompt.system.clone() },
        ChatMessageReq { role: "user".into(), content: prompt.user.clone() },
      ],
      temperature: prompt.temperature,
      response_format: prompt.json_output.then(|| ResponseFormat { r#type: "json_object".into() }),
      max_tokens: Some(prompt.max_output_tokens),
    };

    let started = Instant::now();
    let res = self
      .client
      .post(&url)
      .timeout(timeout)
      .header(USER_AGENT, "lessonforge-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await
      .map_err(|e| transport_error(e, timeout))?;

    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      let err = classify_status(status, &body);
      warn!(target: "lessonforge_backend", %status, transient = err.is_transient(), error = %err, "OpenAI request failed");
      return Err(err);
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| transport_error(e, timeout))?;
    let choice = body.choices.into_iter().next();
    let finish_reason = choice.as_ref().and_then(|c| c.finish_reason.clone()).unwrap_or_default();
    let text = choice.and_then(|c| c.message.content).unwrap_or_default().trim().to_string();

    let usage = body.usage.unwrap_or_default();
    info!(
      target: "lessonforge_backend",
      latency_ms = started.elapsed().as_millis() as u64,
      prompt_tokens = ?usage.prompt_tokens,
      completion_tokens = ?usage.completion_tokens,
      %finish_reason,
      text_len = text.len(),
      "OpenAI completion"
    );
    Ok(text)
  }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> GatewayError {
  if e.is_timeout() {
    GatewayError::Timeout(timeout)
  } else {
    GatewayError::Transient(e.to_string())
  }
}

/// Map a non-success HTTP status (plus the provider's error body) onto the gateway taxonomy.
fn classify_status(status: StatusCode, body: &str) -> GatewayError {
  let detail = extract_openai_error(body);
  let msg = match &detail {
    Some(d) => format!("OpenAI HTTP {}: {}", status.as_u16(), d.message),
    None => format!("OpenAI HTTP {}", status.as_u16()),
  };
  let quota_exhausted = detail
    .as_ref()
    .map(|d| d.code.as_deref() == Some("insufficient_quota") || d.kind.as_deref() == Some("insufficient_quota"))
    .unwrap_or(false);

  match status {
    StatusCode::TOO_MANY_REQUESTS if quota_exhausted => GatewayError::Terminal(msg),
    StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => GatewayError::Transient(msg),
    s if s.is_server_error() => GatewayError::Transient(msg),
    _ => GatewayError::Terminal(msg),
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice {
  message: ChatMessageResp,
  #[serde(default)] finish_reason: Option<String>,
}
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize, Default)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
}

struct OpenAiErrorDetail {
  message: String,
  kind: Option<String>,
  code: Option<String>,
}

/// Try to extract a clean error message (plus type/code) from an OpenAI error body.
fn extract_openai_error(body: &str) -> Option<OpenAiErrorDetail> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj {
    #[serde(default)] message: String,
    #[serde(default, rename = "type")] kind: Option<String>,
    #[serde(default)] code: Option<serde_json::Value>,
  }
  let w = serde_json::from_str::<EWrap>(body).ok()?;
  let code = w.error.code.and_then(|c| c.as_str().map(str::to_string));
  Some(OpenAiErrorDetail { message: w.error.message, kind: w.error.kind, code })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn body(kind: &str, code: &str, message: &str) -> String {
    serde_json::json!({"error": {"message": message, "type": kind, "code": code}}).to_string()
  }

  #[test]
  fn rate_limits_and_server_errors_are_transient() {
    let rl = classify_status(StatusCode::TOO_MANY_REQUESTS, &body("requests", "rate_limit_exceeded", "slow down"));
    assert!(matches!(rl, GatewayError::Transient(ref m) if m.contains("slow down")));
    assert!(classify_status(StatusCode::BAD_GATEWAY, "<html>").is_transient());
    assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
  }

  #[test]
  fn quota_and_auth_failures_are_terminal() {
    let quota = classify_status(StatusCode::TOO_MANY_REQUESTS, &body("insufficient_quota", "insufficient_quota", "You exceeded your quota"));
    assert!(!quota.is_transient());
    assert!(!classify_status(StatusCode::UNAUTHORIZED, &body("invalid_request_error", "invalid_api_key", "bad key")).is_transient());
    assert!(!classify_status(StatusCode::BAD_REQUEST, "").is_transient());
  }

  #[test]
  fn error_body_without_code_still_yields_message() {
    let d = extract_openai_error(r#"{"error": {"message": "boom", "code": null}}"#).unwrap();
    assert_eq!(d.message, "boom");
    assert!(d.code.is_none());
    assert!(extract_openai_error("not json").is_none());
  }
}
