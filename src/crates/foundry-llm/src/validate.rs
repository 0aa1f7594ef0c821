//! JSON-schema validation of structured model output.

use crate::error::{LlmError, Result};
use jsonschema::JSONSchema;
use serde_json::Value;

/// Validate a JSON-mode reply against the configured output schema.
///
/// Collects every violation into one message so callers surface a single,
/// complete validation error.
pub fn validate_against_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = JSONSchema::compile(schema)
        .map_err(|e| LlmError::Config(format!("invalid output schema: {e}")))?;

    let result = compiled.validate(instance);
    if let Err(errors) = result {
        let detail = errors
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(LlmError::SchemaValidation(detail));
    }
    Ok(())
}

/// Parse text into JSON, tolerating fenced code blocks around the payload.
pub fn parse_json_reply(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);
    serde_json::from_str(stripped)
        .map_err(|e| LlmError::InvalidResponse(format!("reply is not valid JSON: {e}")))
}
