//! Response Sanitizer: makes raw model text safe to parse as JSON.
//!
//! Steps, in order:
//! 1) strip one fenced-code wrapper (```json ... ```),
//! 2) drop control and invisible characters (keeping \n, \r, \t),
//! 3) escape literal line breaks and tabs that sit inside string literals,
//! 4) refuse text whose braces/brackets do not balance outside strings (truncated),
//! 5) parse.
//!
//! Knows nothing about courses or lessons.

use serde_json::Value;

use crate::error::SanitizeError;

/// Repaired text plus the parsed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
  pub text: String,
  pub value: Value,
}

pub fn sanitize(raw: &str) -> Result<Sanitized, SanitizeError> {
  let unfenced = strip_code_fence(raw);
  let visible = remove_control_chars(unfenced);
  let repaired = escape_breaks_in_strings(&visible);
  let text = repaired.trim();
  if text.is_empty() {
    return Err(SanitizeError::Empty);
  }

  check_balance(text)?;

  let value = serde_json::from_str::<Value>(text).map_err(|e| SanitizeError::Malformed(e.to_string()))?;
  Ok(Sanitized { text: text.to_string(), value })
}

/// Strip a single leading ``` line (with optional language tag) and a single trailing ```.
fn strip_code_fence(raw: &str) -> &str {
  let mut s = raw.trim();
  if s.starts_with("```") {
    s = match s.find('\n') {
      Some(nl) => &s[nl + 1..],
      None => "",
    };
    s = s.trim_end();
    if let Some(stripped) = s.strip_suffix("```") {
      s = stripped;
    }
  }
  s.trim()
}

fn remove_control_chars(text: &str) -> String {
  text
    .chars()
    .filter(|c| {
      if matches!(*c, '\n' | '\r' | '\t') {
        return true;
      }
      if matches!(*c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}') {
        return false;
      }
      !c.is_control()
    })
    .collect()
}

/// Replace literal \n, \r and \t inside string literals with their escapes.
/// Backslash escapes are honored so `\"` does not end the string.
fn escape_breaks_in_strings(text: &str) -> String {
  let mut out = String::with_capacity(text.len() + 16);
  let mut in_string = false;
  let mut escaped = false;

  for c in text.chars() {
    if !in_string {
      if c == '"' {
        in_string = true;
      }
      out.push(c);
      continue;
    }

    if escaped {
      escaped = false;
      out.push(c);
      continue;
    }

    match c {
      '\\' => {
        escaped = true;
        out.push(c);
      }
      '"' => {
        in_string = false;
        out.push(c);
      }
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\t' => out.push_str("\\t"),
      _ => out.push(c),
    }
  }
  out
}

/// Count structural delimiters outside strings; any imbalance means the
/// model was cut off and the text must not be guessed at.
fn check_balance(text: &str) -> Result<(), SanitizeError> {
  let (mut braces_open, mut braces_close) = (0usize, 0usize);
  let (mut brackets_open, mut brackets_close) = (0usize, 0usize);
  let mut in_string = false;
  let mut escaped = false;

  for c in text.chars() {
    if in_string {
      if escaped {
        escaped = false;
      } else if c == '\\' {
        escaped = true;
      } else if c == '"' {
        in_string = false;
      }
      continue;
    }
    match c {
      '"' => in_string = true,
      '{' => braces_open += 1,
      '}' => braces_close += 1,
      '[' => brackets_open += 1,
      ']' => brackets_close += 1,
      _ => {}
    }
  }

  if braces_open != braces_close || brackets_open != brackets_close {
    return Err(SanitizeError::Truncated {
      open: braces_open + brackets_open,
      close: braces_close + brackets_close,
    });
  }
  if in_string {
    return Err(SanitizeError::UnterminatedString);
  }
  Ok(())
}
