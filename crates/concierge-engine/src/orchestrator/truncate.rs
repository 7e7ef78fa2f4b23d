use serde_json::Value;

/// Truncate text to at most `max_chars` characters, appending a marker with
/// the original and kept lengths.
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output.to_string();
    }
    let kept: String = output.chars().take(max_chars).collect();
    format!("{kept}\n\n[truncated: {total} chars -> {max_chars} chars]")
}

/// Bound a tool's JSON output before it goes back into the prompt context.
/// Oversized structured output is replaced by its truncated serialisation.
pub fn truncate_value(value: &Value, max_chars: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_output(s, max_chars)),
        other => {
            let rendered = other.to_string();
            if rendered.chars().count() <= max_chars {
                other.clone()
            } else {
                Value::String(truncate_output(&rendered, max_chars))
            }
        }
    }
}
