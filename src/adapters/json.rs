//! Structured JSON payload adapter.
//!
//! Variant content is an object of fields the caller applies as-is:
//! ```json
//! { "headline": "Save 20%", "button_color": "#ff6600" }
//! ```
//! `null` content renders as an empty object, so a control can be declared
//! without a payload.

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};

use super::ContentAdapter;

/// Max serialized payload size (64KB)
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

pub struct JsonPayloadAdapter;

impl ContentAdapter for JsonPayloadAdapter {
    fn content_type(&self) -> &str {
        "json"
    }

    fn validate(&self, content: &Value) -> Result<()> {
        match content {
            Value::Null => Ok(()),
            Value::Object(_) => {
                let size = serde_json::to_string(content)?.len();
                if size > MAX_PAYLOAD_SIZE {
                    return Err(anyhow!(
                        "payload too large: {size} bytes (max: {MAX_PAYLOAD_SIZE})"
                    ));
                }
                Ok(())
            }
            other => Err(anyhow!(
                "json content must be an object or null, got: {}",
                kind(other)
            )),
        }
    }

    fn render(&self, content: &Value) -> Result<Value> {
        self.validate(content)?;
        Ok(match content {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        })
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_objects_and_null() {
        let adapter = JsonPayloadAdapter;
        assert!(adapter.validate(&json!({"headline": "Hi"})).is_ok());
        assert!(adapter.validate(&Value::Null).is_ok());
    }

    #[test]
    fn test_rejects_scalars() {
        let err = JsonPayloadAdapter.validate(&json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("array"));
        assert!(JsonPayloadAdapter.validate(&json!("text")).is_err());
    }

    #[test]
    fn test_render_null_as_empty_object() {
        assert_eq!(JsonPayloadAdapter.render(&Value::Null).unwrap(), json!({}));
        let payload = json!({"color": "blue"});
        assert_eq!(JsonPayloadAdapter.render(&payload).unwrap(), payload);
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let big = json!({"blob": "x".repeat(MAX_PAYLOAD_SIZE)});
        assert!(JsonPayloadAdapter.validate(&big).is_err());
    }
}
