use concierge_core::generation::OutputSchema;
use serde_json::Value;

/// Structural check of a terminal answer against its output schema.
pub trait ResponseValidator: Send + Sync {
    /// `Err` carries one message per violation.
    fn validate(&self, response: &Value, schema: &OutputSchema) -> Result<(), Vec<String>>;
}

/// Checks that the answer is an object, every `required` key is present,
/// each declared primitive `type` holds, and any `response` text is
/// non-empty.
#[derive(Clone, Copy, Debug, Default)]
pub struct StructuralValidator;

impl ResponseValidator for StructuralValidator {
    fn validate(&self, response: &Value, schema: &OutputSchema) -> Result<(), Vec<String>> {
        let Some(object) = response.as_object() else {
            return Err(vec![format!(
                "response must be a JSON object matching schema `{}`",
                schema.name
            )]);
        };

        let mut errors = Vec::new();
        for field in schema.required_fields() {
            if !object.contains_key(field) {
                errors.push(format!("missing required field `{field}`"));
            }
        }
        for (field, value) in object {
            if let Some(expected) = schema.property_type(field) {
                if !type_matches(expected, value) {
                    errors.push(format!("field `{field}` must be of type {expected}"));
                }
            }
        }
        if let Some(text) = object.get("response").and_then(Value::as_str) {
            if text.trim().is_empty() {
                errors.push("field `response` must not be empty".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}
