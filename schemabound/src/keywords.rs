//! Rewriting of OpenAPI-specific keywords into plain JSON Schema.

use serde_json::{Map, Value, json};

use crate::config::TransformConfig;
use crate::keys::MOVED_SCHEMAS_KEY;

/// Replace OpenAPI keywords of a single schema node with JSON Schema equivalents.
pub fn transform_keywords(schema: &mut Map<String, Value>, config: &TransformConfig) {
    match schema.get("type").and_then(Value::as_str) {
        Some("file") => replace_file_type(schema),
        Some("object") => {
            if config.remove_write_only {
                // Write-only properties never occur in responses
                rewrite_properties(schema, is_write_only);
            }
            if config.remove_read_only {
                // Read-only properties never occur in requests
                rewrite_properties(schema, is_read_only);
            }
        }
        _ => {}
    }
    if schema.get(config.nullable_key.as_str()) == Some(&Value::Bool(true)) {
        replace_nullable(schema, &config.nullable_key);
    }
}

fn replace_file_type(schema: &mut Map<String, Value>) {
    schema.insert("type".to_string(), json!("string"));
    schema.insert("format".to_string(), json!("binary"));
}

fn rewrite_properties(schema: &mut Map<String, Value>, predicate: fn(&Value) -> bool) {
    let forbidden: Vec<String> = match schema.get("properties") {
        Some(Value::Object(properties)) => properties
            .iter()
            .filter(|(_, subschema)| predicate(subschema))
            .map(|(name, _)| name.clone())
            .collect(),
        _ => return,
    };
    if forbidden.is_empty() {
        return;
    }
    if let Some(Value::Object(properties)) = schema.get_mut("properties") {
        for name in &forbidden {
            properties.shift_remove(name);
        }
    }
    if let Some(Value::Array(required)) = schema.get_mut("required") {
        required.retain(|name| {
            name.as_str()
                .is_none_or(|name| !forbidden.iter().any(|item| item == name))
        });
    }
    drop_if_empty(schema, "properties");
    drop_if_empty(schema, "required");
    forbid_properties(schema, &forbidden);
}

fn drop_if_empty(schema: &mut Map<String, Value>, keyword: &str) {
    let empty = match schema.get(keyword) {
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    };
    if empty {
        schema.shift_remove(keyword);
    }
}

/// Make every name in `forbidden` provably absent.
///
/// `not: {required: [a, b]}` alone would still admit an instance carrying only
/// `a`, so several names are forbidden one by one through `anyOf`.
fn forbid_properties(schema: &mut Map<String, Value>, forbidden: &[String]) {
    let clause = match forbidden {
        [name] => json!({"required": [name]}),
        names => json!({
            "anyOf": names.iter().map(|name| json!({"required": [name]})).collect::<Vec<_>>()
        }),
    };
    if schema.contains_key("not") {
        let all_of = schema
            .entry("allOf")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = all_of {
            items.push(json!({ "not": clause }));
        }
    } else {
        schema.insert("not".to_string(), clause);
    }
}

fn is_write_only(schema: &Value) -> bool {
    flag(schema, "writeOnly") || flag(schema, "x-writeOnly")
}

fn is_read_only(schema: &Value) -> bool {
    flag(schema, "readOnly")
}

fn flag(schema: &Value, keyword: &str) -> bool {
    schema.get(keyword).and_then(Value::as_bool).unwrap_or(false)
}

fn replace_nullable(schema: &mut Map<String, Value>, nullable_key: &str) {
    schema.shift_remove(nullable_key);
    let moved = schema.shift_remove(MOVED_SCHEMAS_KEY);
    let inner = std::mem::take(schema);
    schema.insert(
        "anyOf".to_string(),
        Value::Array(vec![Value::Object(inner), json!({"type": "null"})]),
    );
    if let Some(moved) = moved {
        schema.insert(MOVED_SCHEMAS_KEY.to_string(), moved);
    }
}
