//! Narrowing of a schema once recursive inlining has run out of depth.
//!
//! The result is the largest sub-schema that can no longer reach a forbidden
//! reference. Untouched keywords are passed through as they are, and an
//! unchanged schema is returned borrowed.

use std::borrow::Cow;
use std::collections::HashSet;

use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::error::InfiniteRecursionError;
use crate::iteration::reference_of;

/// Narrow `schema` so that it does not reach any reference in `forbidden`.
pub fn prune<'a>(
    schema: &'a Value,
    forbidden: &HashSet<String>,
) -> Result<Cow<'a, Value>, InfiniteRecursionError> {
    let Value::Object(map) = schema else {
        return Ok(Cow::Borrowed(schema));
    };
    if map.is_empty() {
        return Ok(Cow::Borrowed(schema));
    }
    if is_forbidden(schema, forbidden) {
        return Ok(Cow::Owned(json!({})));
    }

    let mut edit = Edit::default();
    for (keyword, value) in map {
        match keyword.as_str() {
            "additionalProperties" if value.is_object() => {
                additional_properties(map, value, forbidden, &mut edit)?
            }
            "items" | "prefixItems" => match value {
                Value::Array(items) => tuple(keyword, map, items, forbidden, &mut edit)?,
                Value::Object(_) => items(map, value, forbidden, &mut edit)?,
                _ => {}
            },
            "additionalItems" => match value {
                Value::Array(members) => all_members(keyword, members, forbidden, &mut edit)?,
                Value::Object(_) => additional_items(map, value, forbidden, &mut edit)?,
                _ => {}
            },
            "properties" => properties(map, value, forbidden, &mut edit)?,
            "patternProperties" => pattern_properties(map, value, forbidden, &mut edit)?,
            "propertyNames" => property_names(map, value, forbidden, &mut edit)?,
            "anyOf" => any_of(value, forbidden, &mut edit)?,
            "allOf" | "oneOf" => {
                if let Value::Array(members) = value {
                    all_members(keyword, members, forbidden, &mut edit)?
                }
            }
            "contains" | "if" | "then" | "else" => nested(keyword, value, forbidden, &mut edit)?,
            "dependentSchemas" | "dependencies" => dependent(keyword, value, forbidden, &mut edit)?,
            "not" => unchanged(keyword, value, forbidden)?,
            _ => {}
        }
    }
    Ok(edit.apply(schema, map))
}

fn is_forbidden(schema: &Value, forbidden: &HashSet<String>) -> bool {
    reference_of(schema).is_some_and(|reference| forbidden.contains(reference))
}

/// Replacements and removals collected for one schema.
#[derive(Default)]
struct Edit {
    replaced: Map<String, Value>,
    removed: Vec<String>,
}

impl Edit {
    fn replace(&mut self, keyword: &str, value: Value) {
        self.replaced.insert(keyword.to_string(), value);
    }

    fn remove(&mut self, keyword: &str) {
        self.removed.push(keyword.to_string());
    }

    /// Lower an upper bound such as `maxItems`, never raising an existing one.
    fn cap(&mut self, schema: &Map<String, Value>, keyword: &str, limit: u64) {
        let current = self
            .replaced
            .get(keyword)
            .or_else(|| schema.get(keyword))
            .and_then(Value::as_u64);
        let limit = current.map_or(limit, |current| current.min(limit));
        self.replace(keyword, json!(limit));
    }

    fn apply<'a>(mut self, schema: &'a Value, map: &Map<String, Value>) -> Cow<'a, Value> {
        if self.replaced.is_empty() && self.removed.is_empty() {
            return Cow::Borrowed(schema);
        }
        let mut result = Map::new();
        for (keyword, value) in map {
            if self.removed.contains(keyword) {
                continue;
            }
            match self.replaced.shift_remove(keyword) {
                Some(new) => result.insert(keyword.clone(), new),
                None => result.insert(keyword.clone(), value.clone()),
            };
        }
        for (keyword, value) in self.replaced {
            if !self.removed.contains(&keyword) {
                result.insert(keyword, value);
            }
        }
        Cow::Owned(Value::Object(result))
    }
}

/// What pruning did to one sub-schema slot.
enum Outcome {
    Keep,
    Replace(Value),
    Unsatisfiable(InfiniteRecursionError),
}

fn outcome(keyword: &str, value: &Value, forbidden: &HashSet<String>) -> Outcome {
    if let Some(reference) = reference_of(value).filter(|r| forbidden.contains(*r)) {
        return Outcome::Unsatisfiable(
            InfiniteRecursionError::new(format!("Infinite recursion in {keyword}"))
                .with_reference(reference),
        );
    }
    match prune(value, forbidden) {
        Ok(Cow::Borrowed(_)) => Outcome::Keep,
        Ok(Cow::Owned(new)) => Outcome::Replace(new),
        Err(err) => Outcome::Unsatisfiable(err),
    }
}

/// Error for a slot that must hold but cannot, keeping the offending reference.
fn escalate(message: String, cause: InfiniteRecursionError) -> InfiniteRecursionError {
    let err = InfiniteRecursionError::new(message);
    match cause.reference() {
        Some(reference) => err.with_reference(reference),
        None => err,
    }
}

fn unsigned(schema: &Map<String, Value>, keyword: &str) -> u64 {
    schema.get(keyword).and_then(Value::as_u64).unwrap_or(0)
}

fn required(schema: &Map<String, Value>) -> Vec<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn additional_properties(
    schema: &Map<String, Value>,
    value: &Value,
    forbidden: &HashSet<String>,
    edit: &mut Edit,
) -> Result<(), InfiniteRecursionError> {
    match outcome("additionalProperties", value, forbidden) {
        Outcome::Keep => {}
        Outcome::Replace(new) => edit.replace("additionalProperties", new),
        Outcome::Unsatisfiable(cause) => {
            let named = schema
                .get("properties")
                .and_then(Value::as_object)
                .map_or(0, Map::len) as u64;
            if unsigned(schema, "minProperties") > named {
                return Err(escalate(
                    "Infinite recursion in additionalProperties".to_string(),
                    cause,
                ));
            }
            edit.replace("additionalProperties", Value::Bool(false));
        }
    }
    Ok(())
}

fn items(
    schema: &Map<String, Value>,
    value: &Value,
    forbidden: &HashSet<String>,
    edit: &mut Edit,
) -> Result<(), InfiniteRecursionError> {
    match outcome("items", value, forbidden) {
        Outcome::Keep => {}
        Outcome::Replace(new) => edit.replace("items", new),
        Outcome::Unsatisfiable(cause) => {
            if unsigned(schema, "minItems") > 0 {
                return Err(escalate("Infinite recursion in items".to_string(), cause));
            }
            edit.remove("items");
            edit.cap(schema, "maxItems", 0);
        }
    }
    Ok(())
}

/// Tuple form: cut the tuple right before the first element that cannot be kept.
fn tuple(
    keyword: &str,
    schema: &Map<String, Value>,
    members: &[Value],
    forbidden: &HashSet<String>,
    edit: &mut Edit,
) -> Result<(), InfiniteRecursionError> {
    let mut kept = Vec::with_capacity(members.len());
    let mut changed = false;
    for (idx, member) in members.iter().enumerate() {
        match outcome(keyword, member, forbidden) {
            Outcome::Keep => kept.push(member.clone()),
            Outcome::Replace(new) => {
                changed = true;
                kept.push(new);
            }
            Outcome::Unsatisfiable(cause) => {
                if unsigned(schema, "minItems") > idx as u64 {
                    return Err(escalate(
                        format!("Infinite recursion in {keyword} at position {idx}"),
                        cause,
                    ));
                }
                edit.cap(schema, "maxItems", idx as u64);
                if idx == 0 {
                    edit.remove(keyword);
                } else {
                    edit.replace(keyword, Value::Array(kept));
                }
                return Ok(());
            }
        }
    }
    if changed {
        edit.replace(keyword, Value::Array(kept));
    }
    Ok(())
}

fn additional_items(
    schema: &Map<String, Value>,
    value: &Value,
    forbidden: &HashSet<String>,
    edit: &mut Edit,
) -> Result<(), InfiniteRecursionError> {
    match outcome("additionalItems", value, forbidden) {
        Outcome::Keep => {}
        Outcome::Replace(new) => edit.replace("additionalItems", new),
        Outcome::Unsatisfiable(cause) => {
            if let Some(Value::Array(prefix)) = schema.get("items") {
                if unsigned(schema, "minItems") > prefix.len() as u64 {
                    return Err(escalate(
                        "Infinite recursion in additionalItems".to_string(),
                        cause,
                    ));
                }
            }
            edit.replace("additionalItems", Value::Bool(false));
        }
    }
    Ok(())
}

/// A property that can only lead into the recursion is pinned to `false`.
///
/// Dropping it from `properties` alone would hand it over to
/// `additionalProperties`, which usually accepts anything.
fn properties(
    schema: &Map<String, Value>,
    value: &Value,
    forbidden: &HashSet<String>,
    edit: &mut Edit,
) -> Result<(), InfiniteRecursionError> {
    let Value::Object(properties) = value else {
        return Ok(());
    };
    let required = required(schema);
    let mut changed = false;
    let mut new = Map::new();
    for (name, subschema) in properties {
        match outcome("properties", subschema, forbidden) {
            Outcome::Keep => {
                new.insert(name.clone(), subschema.clone());
            }
            Outcome::Replace(narrowed) => {
                changed = true;
                new.insert(name.clone(), narrowed);
            }
            Outcome::Unsatisfiable(cause) => {
                if required.contains(&name.as_str()) {
                    return Err(escalate(
                        format!("Infinite recursion in the required property `{name}`"),
                        cause,
                    ));
                }
                changed = true;
                new.insert(name.clone(), Value::Bool(false));
            }
        }
    }
    if changed {
        edit.replace("properties", Value::Object(new));
    }
    Ok(())
}

fn pattern_properties(
    schema: &Map<String, Value>,
    value: &Value,
    forbidden: &HashSet<String>,
    edit: &mut Edit,
) -> Result<(), InfiniteRecursionError> {
    let Value::Object(patterns) = value else {
        return Ok(());
    };
    let required = required(schema);
    let mut changed = false;
    let mut new = Map::new();
    for (pattern, subschema) in patterns {
        match outcome("patternProperties", subschema, forbidden) {
            Outcome::Keep => {
                new.insert(pattern.clone(), subschema.clone());
            }
            Outcome::Replace(narrowed) => {
                changed = true;
                new.insert(pattern.clone(), narrowed);
            }
            Outcome::Unsatisfiable(cause) => {
                if let Some(name) = required_match(pattern, &required) {
                    return Err(escalate(
                        format!(
                            "Infinite recursion in the required property `{name}` matching `{pattern}`"
                        ),
                        cause,
                    ));
                }
                changed = true;
                new.insert(pattern.clone(), Value::Bool(false));
            }
        }
    }
    if changed {
        edit.replace("patternProperties", Value::Object(new));
    }
    Ok(())
}

fn required_match<'r>(pattern: &str, required: &[&'r str]) -> Option<&'r str> {
    match Regex::new(pattern) {
        Ok(regex) => required.iter().copied().find(|name| regex.is_match(name)),
        Err(err) => {
            warn!("Invalid patternProperties regex `{}`: {}", pattern, err);
            None
        }
    }
}

fn property_names(
    schema: &Map<String, Value>,
    value: &Value,
    forbidden: &HashSet<String>,
    edit: &mut Edit,
) -> Result<(), InfiniteRecursionError> {
    match outcome("propertyNames", value, forbidden) {
        Outcome::Keep => {}
        Outcome::Replace(new) => edit.replace("propertyNames", new),
        Outcome::Unsatisfiable(cause) => {
            if unsigned(schema, "minProperties") > 0 {
                return Err(escalate(
                    "Infinite recursion in propertyNames".to_string(),
                    cause,
                ));
            }
            edit.remove("propertyNames");
            edit.cap(schema, "maxProperties", 0);
        }
    }
    Ok(())
}

fn any_of(
    value: &Value,
    forbidden: &HashSet<String>,
    edit: &mut Edit,
) -> Result<(), InfiniteRecursionError> {
    let Value::Array(members) = value else {
        return Ok(());
    };
    let mut kept = Vec::with_capacity(members.len());
    let mut changed = false;
    let mut last_cause = None;
    for member in members {
        match outcome("anyOf", member, forbidden) {
            Outcome::Keep => kept.push(member.clone()),
            Outcome::Replace(new) => {
                changed = true;
                kept.push(new);
            }
            Outcome::Unsatisfiable(cause) => {
                changed = true;
                last_cause = Some(cause);
            }
        }
    }
    if kept.is_empty() && !members.is_empty() {
        let message = "Infinite recursion in anyOf".to_string();
        return Err(match last_cause {
            Some(cause) => escalate(message, cause),
            None => InfiniteRecursionError::new(message),
        });
    }
    if changed {
        edit.replace("anyOf", Value::Array(kept));
    }
    Ok(())
}

/// `allOf`, `oneOf` and sequence-valued `additionalItems`: every member has to
/// be kept, so a single unsatisfiable member sinks the keyword.
fn all_members(
    keyword: &str,
    members: &[Value],
    forbidden: &HashSet<String>,
    edit: &mut Edit,
) -> Result<(), InfiniteRecursionError> {
    let mut kept = Vec::with_capacity(members.len());
    let mut changed = false;
    for member in members {
        match outcome(keyword, member, forbidden) {
            Outcome::Keep => kept.push(member.clone()),
            Outcome::Replace(new) => {
                changed = true;
                kept.push(new);
            }
            Outcome::Unsatisfiable(cause) => {
                return Err(escalate(format!("Infinite recursion in {keyword}"), cause));
            }
        }
    }
    if changed {
        edit.replace(keyword, Value::Array(kept));
    }
    Ok(())
}

fn nested(
    keyword: &str,
    value: &Value,
    forbidden: &HashSet<String>,
    edit: &mut Edit,
) -> Result<(), InfiniteRecursionError> {
    match outcome(keyword, value, forbidden) {
        Outcome::Keep => Ok(()),
        Outcome::Replace(new) => {
            edit.replace(keyword, new);
            Ok(())
        }
        Outcome::Unsatisfiable(cause) => Err(cause),
    }
}

fn dependent(
    keyword: &str,
    value: &Value,
    forbidden: &HashSet<String>,
    edit: &mut Edit,
) -> Result<(), InfiniteRecursionError> {
    let Value::Object(dependencies) = value else {
        return Ok(());
    };
    let mut changed = false;
    let mut new = Map::new();
    for (name, subschema) in dependencies {
        if !subschema.is_object() {
            new.insert(name.clone(), subschema.clone());
            continue;
        }
        match outcome(keyword, subschema, forbidden) {
            Outcome::Keep => {
                new.insert(name.clone(), subschema.clone());
            }
            Outcome::Replace(narrowed) => {
                changed = true;
                new.insert(name.clone(), narrowed);
            }
            Outcome::Unsatisfiable(cause) => return Err(cause),
        }
    }
    if changed {
        edit.replace(keyword, Value::Object(new));
    }
    Ok(())
}

/// `not` is evaluated negated, so narrowing the inner schema would widen the
/// outer one.
fn unchanged(
    keyword: &str,
    value: &Value,
    forbidden: &HashSet<String>,
) -> Result<(), InfiniteRecursionError> {
    match outcome(keyword, value, forbidden) {
        Outcome::Keep => Ok(()),
        Outcome::Replace(_) => Err(InfiniteRecursionError::new(format!(
            "Infinite recursion in {keyword}"
        ))),
        Outcome::Unsatisfiable(cause) => {
            Err(escalate(format!("Infinite recursion in {keyword}"), cause))
        }
    }
}
