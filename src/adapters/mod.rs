//! Content adapter trait and registry keyed by content-type tag.
//!
//! The engine treats variant content as opaque JSON. Adapters own the meaning
//! of a content type:
//! - `json`: structured payload objects, rendered as-is
//! - `text`: plain copy (headlines, labels), rendered as a trimmed string
//!
//! Experiments whose content type has no registered adapter skip content
//! validation at creation time; rendering them fails.

pub mod json;
pub mod text;

use anyhow::Result;
use serde_json::Value;

/// Validation and rendering for one content type
pub trait ContentAdapter: Send + Sync {
    /// Content-type tag this adapter handles
    fn content_type(&self) -> &str;

    /// Reject content this adapter could not render
    fn validate(&self, content: &Value) -> Result<()>;

    /// Produce the payload served for a variant
    fn render(&self, content: &Value) -> Result<Value>;
}

/// Registry of content adapters
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn ContentAdapter>>,
}

impl AdapterRegistry {
    /// Create a registry with all built-in adapters.
    pub fn new() -> Self {
        Self {
            adapters: vec![Box::new(json::JsonPayloadAdapter), Box::new(text::TextAdapter)],
        }
    }

    /// Registry without any adapters
    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Register an adapter, replacing any existing adapter for the same tag.
    pub fn register(&mut self, adapter: Box<dyn ContentAdapter>) {
        self.adapters
            .retain(|existing| existing.content_type() != adapter.content_type());
        self.adapters.push(adapter);
    }

    pub fn get(&self, content_type: &str) -> Option<&dyn ContentAdapter> {
        self.adapters
            .iter()
            .find(|a| a.content_type() == content_type)
            .map(|a| a.as_ref())
    }

    /// Validate content; types without an adapter are accepted unchecked.
    pub fn validate(&self, content_type: &str, content: &Value) -> Result<()> {
        match self.get(content_type) {
            Some(adapter) => adapter.validate(content),
            None => Ok(()),
        }
    }

    /// Render content through the adapter registered for `content_type`.
    pub fn render(&self, content_type: &str, content: &Value) -> Result<Value> {
        match self.get(content_type) {
            Some(adapter) => adapter.render(content),
            None => anyhow::bail!(
                "No adapter registered for content type '{}'. Available: {}",
                content_type,
                self.list_content_types().join(", ")
            ),
        }
    }

    /// List all registered content-type tags.
    pub fn list_content_types(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.content_type()).collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
