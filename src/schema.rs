use jsonschema::validator_for;
use serde_json::Value;

/// JSON Schema (draft 2020-12) for one outbound response line.
pub const RESPONSE_SCHEMA: &str = r#"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "cache program response",
  "type": "object",
  "required": ["id"],
  "additionalProperties": false,
  "properties": {
    "id": { "type": "integer" },
    "err": { "type": "string", "minLength": 1 },
    "known_commands": {
      "type": "array",
      "minItems": 1,
      "uniqueItems": true,
      "items": { "enum": ["get", "put", "close"] }
    },
    "miss": { "const": true },
    "output_id": { "type": "string", "minLength": 1, "contentEncoding": "base64" },
    "size": { "type": "integer", "not": { "const": 0 } },
    "time": { "type": "string", "minLength": 1 },
    "disk_path": { "type": "string", "minLength": 1 }
  }
}"#;

/// JSON Schema (draft 2020-12) for one inbound request line.
pub const REQUEST_SCHEMA: &str = r#"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "cache program request",
  "type": "object",
  "required": ["id", "command"],
  "properties": {
    "id": { "type": "integer" },
    "command": { "type": "string" },
    "action_id": { "type": ["string", "null"] },
    "output_id": { "type": ["string", "null"] },
    "body_size": { "type": "integer", "minimum": 0 }
  }
}"#;

#[derive(Debug, thiserror::Error)]
pub enum SchemaValidationError {
    #[error("Schema parse error: {0}")]
    SchemaParse(#[from] serde_json::Error),
    #[error("Schema compile error: {0}")]
    SchemaCompile(String),
    #[error("Instance validation failed: {0}")]
    ValidationFailed(String),
}

/// Validate a JSON instance against a JSON Schema (draft 2020-12).
pub fn validate_json(schema_str: &str, instance_str: &str) -> Result<(), SchemaValidationError> {
    let schema_json: Value = serde_json::from_str(schema_str)?;
    let instance_json: Value = serde_json::from_str(instance_str)?;

    let validator = validator_for(&schema_json)
        .map_err(|e| SchemaValidationError::SchemaCompile(e.to_string()))?;

    if validator.is_valid(&instance_json) {
        return Ok(());
    }
    let detail = validator
        .iter_errors(&instance_json)
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    Err(SchemaValidationError::ValidationFailed(detail))
}

/// Validate one encoded response line against [`RESPONSE_SCHEMA`].
pub fn validate_response(line: &str) -> Result<(), SchemaValidationError> {
    validate_json(RESPONSE_SCHEMA, line)
}
