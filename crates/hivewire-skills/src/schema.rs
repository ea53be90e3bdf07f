//! Minimal JSON-Schema-style validation for skill contracts.
//!
//! Supports the subset the skill descriptors use: `type`, `required`,
//! `properties`, `enum`, and `items`. Anything the schema does not mention
//! passes; the point is catching shape mismatches at the boundary, not full
//! draft compliance.

use serde_json::Value;

/// Validate `value` against `schema`. Returns the first violation found.
pub fn validate(value: &Value, schema: &Value) -> Result<(), String> {
    validate_at(value, schema, "$")
}

fn validate_at(value: &Value, schema: &Value, path: &str) -> Result<(), String> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema_obj.get("type").and_then(|t| t.as_str()) {
        if !type_matches(value, expected) {
            return Err(format!(
                "{path}: expected {expected}, got {}",
                type_name(value)
            ));
        }
    }

    if let Some(allowed) = schema_obj.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            return Err(format!("{path}: value {value} not in enum"));
        }
    }

    if let Some(required) = schema_obj.get("required").and_then(|r| r.as_array()) {
        for name in required.iter().filter_map(|n| n.as_str()) {
            let present = value
                .as_object()
                .is_some_and(|o| o.get(name).is_some_and(|v| !v.is_null()));
            if !present {
                return Err(format!("{path}: missing required field '{name}'"));
            }
        }
    }

    if let Some(properties) = schema_obj.get("properties").and_then(|p| p.as_object()) {
        if let Some(object) = value.as_object() {
            for (name, prop_schema) in properties {
                if let Some(field) = object.get(name) {
                    if field.is_null() {
                        continue;
                    }
                    validate_at(field, prop_schema, &format!("{path}.{name}"))?;
                }
            }
        }
    }

    if let Some(items) = schema_obj.get("items") {
        if let Some(array) = value.as_array() {
            for (i, item) in array.iter().enumerate() {
                validate_at(item, items, &format!("{path}[{i}]"))?;
            }
        }
    }

    Ok(())
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
