//! Gamma API Response Types
//!
//! Serialization types for the Gamma events endpoint. Gamma encodes
//! list fields such as `clobTokenIds` and `outcomes` as JSON strings
//! (`"[\"1\",\"2\"]"`); both that and a plain array are accepted.

use serde::Deserialize;
use serde_json::Value;

/// Event returned by `GET /events/slug/{slug}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GammaEvent {
  /// Event slug.
  pub slug: Option<String>,
  /// Markets grouped under the event; up/down events carry one.
  #[serde(default)]
  pub markets: Vec<GammaMarket>,
}

/// One market within an event.
#[derive(Debug, Clone, Deserialize)]
pub struct GammaMarket {
  /// Market question, e.g. "Bitcoin Up or Down - May 1, 12:00PM ET".
  pub question: Option<String>,
  /// Outcome token ids, encoded list.
  #[serde(rename = "clobTokenIds")]
  pub clob_token_ids: Option<Value>,
  /// Outcome names aligned with `clob_token_ids`, encoded list.
  pub outcomes: Option<Value>,
}

/// Decode a Gamma list field: either a JSON array of strings or a string
/// holding one.
pub fn string_list(value: &Value) -> Option<Vec<String>> {
  match value {
    Value::String(encoded) => serde_json::from_str(encoded).ok(),
    Value::Array(items) => items
      .iter()
      .map(|item| item.as_str().map(str::to_string))
      .collect(),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_string_list_forms() {
    assert_eq!(
      string_list(&json!("[\"1\", \"2\"]")),
      Some(vec!["1".to_string(), "2".to_string()])
    );
    assert_eq!(
      string_list(&json!(["a", "b"])),
      Some(vec!["a".to_string(), "b".to_string()])
    );
    assert_eq!(string_list(&json!("not a list")), None);
    assert_eq!(string_list(&json!([1, 2])), None);
    assert_eq!(string_list(&json!(42)), None);
  }
}
