use serde_json::{Map, Value};

/// Which sub-schemas to visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reach {
    /// Only sub-schemas that constrain instances.
    Instance,
    /// Also schemas stored under `definitions` / `$defs`.
    Document,
}

const SINGLE: &[&str] = &[
    "additionalProperties",
    "additionalItems",
    "propertyNames",
    "contains",
    "not",
    "if",
    "then",
    "else",
];
const SEQUENCES: &[&str] = &["anyOf", "oneOf", "allOf", "prefixItems"];
const MAPPINGS: &[&str] = &[
    "properties",
    "patternProperties",
    "dependentSchemas",
    "dependencies",
];
const DEFINITIONS: &[&str] = &["definitions", "$defs"];

fn classify(keyword: &str, reach: Reach) -> Option<Shape> {
    if keyword == "items" {
        Some(Shape::SingleOrSequence)
    } else if SINGLE.contains(&keyword) {
        Some(Shape::Single)
    } else if SEQUENCES.contains(&keyword) {
        Some(Shape::Sequence)
    } else if MAPPINGS.contains(&keyword) {
        Some(Shape::Mapping)
    } else if reach == Reach::Document && DEFINITIONS.contains(&keyword) {
        Some(Shape::Mapping)
    } else {
        None
    }
}

enum Shape {
    Single,
    Sequence,
    SingleOrSequence,
    Mapping,
}

/// Direct object sub-schemas of `schema`.
pub fn subschemas(schema: &Map<String, Value>, reach: Reach) -> Vec<&Value> {
    let mut out = Vec::new();
    for (keyword, value) in schema {
        let Some(shape) = classify(keyword, reach) else {
            continue;
        };
        match shape {
            Shape::Single | Shape::SingleOrSequence if value.is_object() => out.push(value),
            Shape::Sequence | Shape::SingleOrSequence => {
                if let Value::Array(items) = value {
                    out.extend(items.iter().filter(|item| item.is_object()));
                }
            }
            Shape::Mapping => {
                if let Value::Object(map) = value {
                    out.extend(map.values().filter(|item| item.is_object()));
                }
            }
            Shape::Single => {}
        }
    }
    out
}

/// Mutable counterpart of [`subschemas`].
pub fn subschemas_mut(schema: &mut Map<String, Value>, reach: Reach) -> Vec<&mut Value> {
    let mut out = Vec::new();
    for (keyword, value) in schema.iter_mut() {
        let Some(shape) = classify(keyword, reach) else {
            continue;
        };
        match shape {
            Shape::Single | Shape::SingleOrSequence if value.is_object() => out.push(value),
            Shape::Sequence | Shape::SingleOrSequence => {
                if let Value::Array(items) = value {
                    out.extend(items.iter_mut().filter(|item| item.is_object()));
                }
            }
            Shape::Mapping => {
                if let Value::Object(map) = value {
                    out.extend(map.values_mut().filter(|item| item.is_object()));
                }
            }
            Shape::Single => {}
        }
    }
    out
}

/// The `$ref` of a schema node, if it has one.
pub fn reference_of(schema: &Value) -> Option<&str> {
    schema.get("$ref").and_then(Value::as_str)
}
