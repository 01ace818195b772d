use std::sync::Arc;

use percent_encoding::percent_decode_str;
use serde_json::{Value, json};

use schemabound::{
    Components, Registry, ResolutionCache, ResolveError, Resolver, TransformConfig,
    TransformError, to_jsonschema,
};

fn resolver_for(document: Value) -> Arc<dyn Resolver> {
    let registry = Registry::new().with_document("root.json", document);
    Arc::new(registry.resolver("root.json"))
}

fn default_config() -> TransformConfig {
    TransformConfig::new(Arc::new(ResolutionCache::new()))
}

fn transform(document: Value, schema: Value) -> Result<Value, TransformError> {
    to_jsonschema(schema, &resolver_for(document), &default_config())
}

fn collect_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, item) in map {
                if key == "$ref" {
                    if let Value::String(reference) = item {
                        out.push(reference.clone());
                    }
                } else {
                    collect_refs(item, out);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_refs(item, out)),
        _ => {}
    }
}

fn assert_self_contained(schema: &Value) {
    let mut refs = Vec::new();
    collect_refs(schema, &mut refs);
    let moved = schema.get("x-moved-schemas").and_then(Value::as_object);
    for reference in refs {
        let pointer = percent_decode_str(&reference[1..]).decode_utf8_lossy();
        assert!(schema.pointer(&pointer).is_some(), "dangling {reference}");
        assert!(reference.starts_with("#/x-moved-schemas/"), "{reference}");
        assert!(moved.is_some());
    }
}

#[test]
fn test_plain_schema_is_returned_unchanged() {
    let config = default_config();
    let schema = json!({"type": "string", "minLength": 1, "format": "email"});
    let result = to_jsonschema(schema.clone(), &resolver_for(json!({})), &config).unwrap();
    assert_eq!(result, schema);
    assert_eq!(config.cache_state().moved_len(), 0);
}

#[test]
fn test_boolean_schema_is_returned_unchanged() {
    assert_eq!(transform(json!({}), json!(true)).unwrap(), json!(true));
}

#[test]
fn test_local_reference_is_moved() {
    let document = json!({"definitions": {"Name": {"type": "string"}}});
    let schema = json!({
        "type": "object",
        "properties": {"name": {"$ref": "#/definitions/Name"}}
    });
    let result = transform(document, schema).unwrap();
    assert_eq!(
        result,
        json!({
            "type": "object",
            "properties": {"name": {"$ref": "#/x-moved-schemas/-definitions-Name"}},
            "x-moved-schemas": {"-definitions-Name": {"type": "string"}}
        })
    );
    assert_self_contained(&result);
}

#[test]
fn test_reference_chain_is_moved_transitively() {
    let document = json!({
        "definitions": {
            "Order": {"type": "object", "properties": {"item": {"$ref": "#/definitions/Item"}}},
            "Item": {"type": "object", "properties": {"price": {"$ref": "#/definitions/Price"}}},
            "Price": {"type": "number", "minimum": 0}
        }
    });
    let result = transform(document, json!({"$ref": "#/definitions/Order"})).unwrap();
    assert_eq!(
        result,
        json!({
            "$ref": "#/x-moved-schemas/-definitions-Order",
            "x-moved-schemas": {
                "-definitions-Item": {
                    "type": "object",
                    "properties": {"price": {"$ref": "#/x-moved-schemas/-definitions-Price"}}
                },
                "-definitions-Order": {
                    "type": "object",
                    "properties": {"item": {"$ref": "#/x-moved-schemas/-definitions-Item"}}
                },
                "-definitions-Price": {"type": "number", "minimum": 0}
            }
        })
    );
    assert_self_contained(&result);
}

#[test]
fn test_shared_reference_is_moved_once() {
    let document = json!({"definitions": {"Id": {"type": "integer"}}});
    let schema = json!({
        "type": "object",
        "properties": {
            "id": {"$ref": "#/definitions/Id"},
            "parent_id": {"$ref": "#/definitions/Id"}
        }
    });
    let result = transform(document, schema).unwrap();
    let moved = result["x-moved-schemas"].as_object().unwrap();
    assert_eq!(moved.len(), 1);
    assert_eq!(
        result["properties"]["id"],
        result["properties"]["parent_id"]
    );
}

#[test]
fn test_only_reachable_schemas_are_attached() {
    let document = json!({
        "definitions": {
            "A": {"type": "object", "properties": {"b": {"$ref": "#/definitions/B"}}},
            "B": {"type": "string"},
            "C": {"type": "integer"}
        }
    });
    let resolver = resolver_for(document);
    let config = default_config();
    to_jsonschema(json!({"$ref": "#/definitions/C"}), &resolver, &config).unwrap();
    let result = to_jsonschema(json!({"$ref": "#/definitions/A"}), &resolver, &config).unwrap();
    let moved = result["x-moved-schemas"].as_object().unwrap();
    let mut keys: Vec<&String> = moved.keys().collect();
    keys.sort();
    assert_eq!(keys, ["-definitions-A", "-definitions-B"]);
}

#[test]
fn test_input_is_not_shared_with_cache() {
    let document = json!({"definitions": {"Flag": {"type": "boolean"}}});
    let resolver = resolver_for(document);
    let config = default_config();
    let first = to_jsonschema(
        json!({"properties": {"flag": {"$ref": "#/definitions/Flag"}}}),
        &resolver,
        &config,
    )
    .unwrap();
    let second = to_jsonschema(
        json!({"items": {"$ref": "#/definitions/Flag"}}),
        &resolver,
        &config,
    )
    .unwrap();
    assert_eq!(first["x-moved-schemas"], second["x-moved-schemas"]);
    assert_eq!(config.cache_state().moved_len(), 1);
}

#[test]
fn test_single_reference_result_is_memoized() {
    let document = json!({"definitions": {"Name": {"type": "string"}}});
    let resolver = resolver_for(document);
    let config = default_config();
    let schema = json!({"$ref": "#/definitions/Name"});
    let first = to_jsonschema(schema.clone(), &resolver, &config).unwrap();
    assert_eq!(config.cache_state().result("#/definitions/Name"), Some(first.clone()));
    let second = to_jsonschema(schema, &resolver, &config).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_component_table_is_used_before_resolver() {
    let components = Components::new().with_table(
        "#/components/schemas",
        json!({"User": {"type": "object", "properties": {"name": {"type": "string"}}}}),
    );
    let config = default_config().with_components(Arc::new(components));
    // The registered document is empty: a successful result proves the table was used.
    let result = to_jsonschema(
        json!({"$ref": "#/components/schemas/User"}),
        &resolver_for(json!({})),
        &config,
    )
    .unwrap();
    assert_eq!(
        result["x-moved-schemas"]["-components-schemas-User"],
        json!({"type": "object", "properties": {"name": {"type": "string"}}})
    );
}

#[test]
fn test_unresolvable_reference() {
    let err = transform(json!({"definitions": {}}), json!({"$ref": "#/definitions/Missing"}))
        .expect_err("missing reference");
    match err {
        TransformError::Resolve(ResolveError::Unresolvable { reference }) => {
            assert_eq!(reference, "#/definitions/Missing");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_pointer_past_array_end_is_unresolvable() {
    let document = json!({"definitions": {"Pair": [{"type": "string"}]}});
    let err = transform(document, json!({"$ref": "#/definitions/Pair/3"}))
        .expect_err("index out of range");
    assert!(matches!(
        err,
        TransformError::Resolve(ResolveError::Unresolvable { .. })
    ));
}

#[test]
fn test_unknown_moved_reference_is_unresolvable() {
    let err = transform(json!({}), json!({"$ref": "#/x-moved-schemas/-definitions-Gone"}))
        .expect_err("unknown moved schema");
    assert!(err.to_string().contains("#/x-moved-schemas/-definitions-Gone"));
}

#[test]
fn test_keywords_inside_moved_schemas_are_transformed() {
    let document = json!({
        "definitions": {
            "Upload": {
                "type": "object",
                "properties": {
                    "file": {"type": "file"},
                    "note": {"type": "string", "nullable": true}
                }
            }
        }
    });
    let result = transform(document, json!({"$ref": "#/definitions/Upload"})).unwrap();
    assert_eq!(
        result["x-moved-schemas"]["-definitions-Upload"],
        json!({
            "type": "object",
            "properties": {
                "file": {"type": "string", "format": "binary"},
                "note": {"anyOf": [{"type": "string"}, {"type": "null"}]}
            }
        })
    );
}

#[test]
fn test_references_inside_definitions_are_moved() {
    let document = json!({"definitions": {"Code": {"type": "integer"}}});
    let schema = json!({
        "$defs": {"Local": {"$ref": "#/definitions/Code"}},
        "type": "object"
    });
    let result = transform(document, schema).unwrap();
    assert_eq!(
        result["$defs"]["Local"],
        json!({"$ref": "#/x-moved-schemas/-definitions-Code"})
    );
    assert_self_contained(&result);
}

#[test]
fn test_result_is_valid_jsonschema() {
    let document = json!({
        "definitions": {
            "Pet": {
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "tag": {"$ref": "#/definitions/Tag"}
                },
                "required": ["name"]
            },
            "Tag": {"type": "string", "maxLength": 3}
        }
    });
    let result = transform(document, json!({"$ref": "#/definitions/Pet"})).unwrap();
    let validator = jsonschema::validator_for(&result).expect("valid schema");
    assert!(validator.is_valid(&json!({"name": "Rex", "tag": "dog"})));
    assert!(!validator.is_valid(&json!({"name": "Rex", "tag": "doggo"})));
    assert!(!validator.is_valid(&json!({"tag": "dog"})));
}

#[test]
fn test_percent_encoded_reference_stays_resolvable() {
    let document = json!({
        "definitions": {
            "a b": {"type": "integer", "minimum": 1}
        }
    });
    let schema = json!({
        "type": "object",
        "properties": {"p": {"$ref": "#/definitions/a%20b"}}
    });
    let result = transform(document, schema).unwrap();
    assert_eq!(
        result["properties"]["p"],
        json!({"$ref": "#/x-moved-schemas/-definitions-a%20b"})
    );
    assert_eq!(
        result["x-moved-schemas"]["-definitions-a b"],
        json!({"type": "integer", "minimum": 1})
    );
    assert_self_contained(&result);

    let validator = jsonschema::validator_for(&result).expect("valid schema");
    assert!(validator.is_valid(&json!({"p": 2})));
    assert!(!validator.is_valid(&json!({"p": 0})));
}
