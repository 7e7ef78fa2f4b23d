use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::BackendError;
use crate::ids::{CallId, ToolCallId};
use crate::tools::{ToolDefinition, ToolInvocationResult};

/// JSON schema the backend must shape its structured answer to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// Top-level `required` keys declared by the schema.
    pub fn required_fields(&self) -> Vec<&str> {
        self.schema
            .get("required")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Declared `type` of a top-level property, if any.
    pub fn property_type(&self, field: &str) -> Option<&str> {
        self.schema
            .get("properties")
            .and_then(|p| p.get(field))
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str)
    }
}

/// Labels for the blocks of a prompt context (debugging, attribution).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionLabel {
    Utterance,
    Transcript,
    Directive,
    FocusedEntities,
    Candidates,
    Assessment,
    ResponseFraming,
    Custom(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptSection {
    pub label: SectionLabel,
    pub content: Value,
}

/// Everything the backend sees for one call, minus the prompt wording itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PromptContext {
    pub sections: Vec<PromptSection>,
    /// Outputs of tools executed earlier in the same call chain.
    pub tool_outputs: Vec<ToolInvocationResult>,
    /// Extra instruction text appended to the call (e.g. validation feedback).
    pub instructions: Vec<String>,
}

impl PromptContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: SectionLabel, content: Value) {
        self.sections.push(PromptSection { label, content });
    }

    pub fn with_section(mut self, label: SectionLabel, content: Value) -> Self {
        self.push(label, content);
        self
    }

    pub fn section(&self, label: &SectionLabel) -> Option<&Value> {
        self.sections
            .iter()
            .find(|s| &s.label == label)
            .map(|s| &s.content)
    }
}

/// One request to the text-generation backend.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub context: PromptContext,
    pub schema: OutputSchema,
    /// Empty when tool calling is disabled for this call.
    pub tools: Vec<ToolDefinition>,
    pub prior_call_id: Option<CallId>,
}

/// A tool call the backend asked for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: ToolCallId,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: ToolCallId::new(),
            name: name.into(),
            arguments,
        }
    }
}

/// The backend's answer: structured JSON, usage count, and any tool requests.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Generation {
    pub text: Value,
    pub usage: u64,
    pub call_id: CallId,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Generation {
    pub fn terminal(text: Value, usage: u64) -> Self {
        Self {
            text,
            usage,
            call_id: CallId::new(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(usage: u64, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            text: Value::Null,
            usage,
            call_id: CallId::new(),
            tool_calls,
        }
    }

    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The text-generation backend. A pure function from the engine's point of
/// view: deadlines and retries are applied by the caller.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &GenerationRequest) -> Result<Generation, BackendError>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<Generation, BackendError> {
        (**self).complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_reads_required_and_types() {
        let schema = OutputSchema::new(
            "reply",
            json!({
                "type": "object",
                "required": ["response", "recommendations"],
                "properties": {
                    "response": {"type": "string"},
                    "recommendations": {"type": "array"}
                }
            }),
        );
        assert_eq!(schema.required_fields(), vec!["response", "recommendations"]);
        assert_eq!(schema.property_type("response"), Some("string"));
        assert_eq!(schema.property_type("missing"), None);
    }

    #[test]
    fn schema_without_required_is_empty() {
        let schema = OutputSchema::new("free", json!({"type": "object"}));
        assert!(schema.required_fields().is_empty());
    }

    #[test]
    fn prompt_context_section_lookup() {
        let ctx = PromptContext::empty()
            .with_section(SectionLabel::Utterance, json!("hello"))
            .with_section(SectionLabel::Custom("x".into()), json!(1));
        assert_eq!(ctx.section(&SectionLabel::Utterance), Some(&json!("hello")));
        assert!(ctx.section(&SectionLabel::Directive).is_none());
    }

    #[test]
    fn generation_constructors() {
        let g = Generation::terminal(json!({"response": "hi"}), 12);
        assert!(!g.requests_tools());
        let g = Generation::with_tool_calls(
            5,
            vec![ToolCallRequest::new("search_practices", json!({"query": "sleep"}))],
        );
        assert!(g.requests_tools());
        assert!(g.text.is_null());
    }
}
