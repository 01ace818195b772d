//! Schemabound: self-contained, finite JSON Schemas from OpenAPI documents.
//!
//! [`to_jsonschema`] turns a schema fragment that may reference other parts of
//! its document (or other documents) into a schema that carries every
//! referenced schema under [`keys::MOVED_SCHEMAS_KEY`], with recursive
//! references unrolled to a bounded depth.

pub mod cache;
pub mod config;
pub mod error;
pub mod inlining;
pub mod iteration;
pub mod keys;
pub mod keywords;
pub mod limit;
pub mod resolver;
pub mod walker;

pub use cache::ResolutionCache;
pub use config::{Components, InlineLimits, TransformConfig};
pub use error::{InfiniteRecursionError, ResolveError, TransformError};
pub use resolver::{DocumentResolver, Registry, Resolved, Resolver, Retrieve};

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use iteration::reference_of;
use keys::MOVED_SCHEMAS_KEY;

/// Keywords that can neither hold a sub-schema nor need rewriting.
const PLAIN_KEYWORDS: &[&str] = &[
    "format",
    "multipleOf",
    "maximum",
    "exclusiveMaximum",
    "minimum",
    "exclusiveMinimum",
    "maxLength",
    "minLength",
    "pattern",
    "maxItems",
    "minItems",
    "uniqueItems",
    "maxProperties",
    "minProperties",
    "required",
    "enum",
    "type",
    "title",
    "description",
    "default",
    "example",
];

/// Make `schema` self-contained and finite.
///
/// Every `$ref` in the result points into the moved-schemas registry at the
/// result's root, and no moved schema refers to itself, directly or through
/// other moved schemas.
pub fn to_jsonschema(
    mut schema: Value,
    resolver: &Arc<dyn Resolver>,
    config: &TransformConfig,
) -> Result<Value, TransformError> {
    if should_skip(&schema) {
        return Ok(schema);
    }

    let state = config.cache_state();
    let memo_key = single_reference(&schema);
    if let Some(reference) = memo_key.as_deref() {
        if let Some(result) = state.result(reference) {
            debug!("Reusing the result for {}", reference);
            return Ok(result);
        }
    }

    let reachable = walker::walk(&mut schema, resolver, config)?;
    if !reachable.is_empty() {
        let mut moved = state.moved_subset(&reachable);
        let recursive = state.recursive_among(&reachable);
        if !recursive.is_empty() {
            inlining::unrecurse(&mut moved, &recursive, config.limits)?;
        }
        if let Value::Object(root) = &mut schema {
            root.insert(MOVED_SCHEMAS_KEY.to_string(), Value::Object(moved));
        }
    }

    if let Some(reference) = memo_key {
        state.remember_result(reference, schema.clone());
    }
    Ok(schema)
}

/// Whether `schema` is already a plain JSON Schema without references.
fn should_skip(schema: &Value) -> bool {
    match schema {
        Value::Object(map) => is_plain(map),
        _ => true,
    }
}

fn is_plain(map: &Map<String, Value>) -> bool {
    map.iter().all(|(keyword, value)| match keyword.as_str() {
        "type" => value.as_str() != Some("file"),
        "items" => match value {
            Value::Object(items) => is_plain(items),
            _ => false,
        },
        "properties" => match value {
            Value::Object(properties) => properties.values().all(|property| match property {
                Value::Object(property) => is_plain(property),
                Value::Bool(_) => true,
                _ => false,
            }),
            _ => false,
        },
        keyword => PLAIN_KEYWORDS.contains(&keyword),
    })
}

/// The reference of a schema consisting of nothing but `$ref`.
fn single_reference(schema: &Value) -> Option<String> {
    match schema {
        Value::Object(map) if map.len() == 1 => reference_of(schema).map(str::to_string),
        _ => None,
    }
}
