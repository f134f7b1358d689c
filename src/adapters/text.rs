//! Plain text adapter for copy experiments (headlines, labels, CTAs).

use anyhow::{anyhow, Result};
use serde_json::Value;

use super::ContentAdapter;

/// Max text length in bytes
pub const MAX_TEXT_LENGTH: usize = 10_000;

pub struct TextAdapter;

impl TextAdapter {
    fn text(content: &Value) -> Result<&str> {
        let text = content
            .as_str()
            .ok_or_else(|| anyhow!("text content must be a string"))?;
        if text.trim().is_empty() {
            return Err(anyhow!("text content cannot be empty"));
        }
        if text.len() > MAX_TEXT_LENGTH {
            return Err(anyhow!(
                "text too long: {} bytes (max: {MAX_TEXT_LENGTH})",
                text.len()
            ));
        }
        Ok(text)
    }
}

impl ContentAdapter for TextAdapter {
    fn content_type(&self) -> &str {
        "text"
    }

    fn validate(&self, content: &Value) -> Result<()> {
        Self::text(content).map(|_| ())
    }

    fn render(&self, content: &Value) -> Result<Value> {
        Ok(Value::String(Self::text(content)?.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate() {
        assert!(TextAdapter.validate(&json!("Start your free trial")).is_ok());
        assert!(TextAdapter.validate(&json!("  ")).is_err());
        assert!(TextAdapter.validate(&json!({"text": "nested"})).is_err());
        assert!(TextAdapter.validate(&Value::Null).is_err());
    }

    #[test]
    fn test_render_trims() {
        assert_eq!(TextAdapter.render(&json!("  Buy now ")).unwrap(), json!("Buy now"));
    }
}
