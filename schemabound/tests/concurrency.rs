use std::sync::Arc;
use std::thread;

use serde_json::{Value, json};

use schemabound::{Registry, ResolutionCache, Resolver, TransformConfig, to_jsonschema};

fn document() -> Value {
    json!({
        "definitions": {
            "Category": {
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "parent": {"$ref": "#/definitions/Category"}
                }
            },
            "Product": {
                "type": "object",
                "properties": {
                    "category": {"$ref": "#/definitions/Category"},
                    "price": {"$ref": "#/definitions/Price"}
                },
                "required": ["price"]
            },
            "Price": {"type": "number", "minimum": 0},
            "Order": {
                "type": "object",
                "properties": {
                    "items": {"type": "array", "items": {"$ref": "#/definitions/Product"}}
                }
            }
        }
    })
}

const TARGETS: &[&str] = &[
    "#/definitions/Order",
    "#/definitions/Product",
    "#/definitions/Category",
    "#/definitions/Price",
];

#[test]
fn test_concurrent_transforms_share_one_cache() {
    let registry = Registry::new().with_document("root.json", document());
    let resolver: Arc<dyn Resolver> = Arc::new(registry.resolver("root.json"));
    let cache = Arc::new(ResolutionCache::new());

    let sequential: Vec<Value> = TARGETS
        .iter()
        .map(|target| {
            let config = TransformConfig::new(Arc::new(ResolutionCache::new()));
            to_jsonschema(json!({"$ref": target}), &resolver, &config).unwrap()
        })
        .collect();

    let concurrent: Vec<Vec<Value>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let resolver = Arc::clone(&resolver);
                let config = TransformConfig::new(Arc::clone(&cache));
                scope.spawn(move || {
                    // Different workers start from different targets.
                    (0..TARGETS.len())
                        .map(|offset| {
                            let idx = (worker + offset) % TARGETS.len();
                            let schema = json!({"$ref": TARGETS[idx]});
                            (idx, to_jsonschema(schema, &resolver, &config).unwrap())
                        })
                        .fold(vec![Value::Null; TARGETS.len()], |mut acc, (idx, value)| {
                            acc[idx] = value;
                            acc
                        })
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    for results in concurrent {
        assert_eq!(results, sequential);
    }
    let state = TransformConfig::new(cache).cache_state();
    assert_eq!(state.moved_len(), 4);
    assert!(state.is_recursive("#/x-moved-schemas/-definitions-Category"));
    assert!(!state.is_recursive("#/x-moved-schemas/-definitions-Product"));
}
