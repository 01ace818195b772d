use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};

use schemabound::resolver::{join_uri, resolve_pointer};
use schemabound::{
    Registry, ResolutionCache, ResolveError, Resolver, Retrieve, TransformConfig, to_jsonschema,
};

struct StaticRetriever {
    calls: AtomicUsize,
}

impl Retrieve for StaticRetriever {
    fn retrieve(&self, uri: &str) -> Result<Value, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match uri {
            "schemas/common.json" => Ok(json!({
                "definitions": {
                    "Money": {
                        "type": "object",
                        "properties": {"currency": {"$ref": "#/definitions/Currency"}}
                    },
                    "Currency": {"type": "string", "pattern": "^[A-Z]{3}$"}
                }
            })),
            other => Err(ResolveError::unretrievable(other, "not found")),
        }
    }
}

fn registry_with_retriever() -> (Registry, Arc<StaticRetriever>) {
    let retriever = Arc::new(StaticRetriever {
        calls: AtomicUsize::new(0),
    });
    let registry = Registry::with_retriever(retriever.clone()).with_document(
        "schemas/root.json",
        json!({"definitions": {"Currency": {"type": "integer"}}}),
    );
    (registry, retriever)
}

#[test]
fn test_resolve_pointer() {
    let document = json!({
        "definitions": {
            "a/b": {"type": "string"},
            "m~n": {"type": "integer"},
            "list": [{"type": "null"}]
        }
    });
    assert_eq!(resolve_pointer(&document, ""), Some(&document));
    assert_eq!(
        resolve_pointer(&document, "/definitions/a~1b"),
        Some(&json!({"type": "string"}))
    );
    assert_eq!(
        resolve_pointer(&document, "/definitions/m~0n"),
        Some(&json!({"type": "integer"}))
    );
    assert_eq!(
        resolve_pointer(&document, "/definitions/list/0"),
        Some(&json!({"type": "null"}))
    );
    assert_eq!(resolve_pointer(&document, "/definitions/list/1"), None);
    assert_eq!(resolve_pointer(&document, "/definitions/a~1b/type/x"), None);
    assert_eq!(resolve_pointer(&document, "definitions"), None);
}

#[test]
fn test_join_uri() {
    assert_eq!(join_uri("schemas/root.json", "common.json"), "schemas/common.json");
    assert_eq!(
        join_uri("specs/v1/root.json", "../shared/common.yaml"),
        "specs/shared/common.yaml"
    );
    assert_eq!(join_uri("/srv/api/root.json", "./types.json"), "/srv/api/types.json");
    assert_eq!(
        join_uri("https://example.com/api/root.json", "common.json"),
        "https://example.com/api/common.json"
    );
    assert_eq!(
        join_uri("schemas/root.json", "https://example.com/common.json"),
        "https://example.com/common.json"
    );
}

#[test]
fn test_local_lookup_keeps_scope() {
    let (registry, _) = registry_with_retriever();
    let resolver = registry.resolver("schemas/root.json");
    let resolved = resolver.lookup("#/definitions/Currency").unwrap();
    assert_eq!(resolved.contents, json!({"type": "integer"}));
    assert_eq!(resolved.resolver.base_uri(), "schemas/root.json");
    assert!(resolved.resolver.dynamic_scope().is_empty());
}

#[test]
fn test_remote_lookup_is_retrieved_once() {
    let (registry, retriever) = registry_with_retriever();
    let resolver = registry.resolver("schemas/root.json");

    let resolved = resolver.lookup("common.json#/definitions/Money").unwrap();
    assert_eq!(resolved.resolver.base_uri(), "schemas/common.json");
    let scope: Vec<String> = resolved
        .resolver
        .dynamic_scope()
        .into_iter()
        .map(|(uri, _)| uri)
        .collect();
    assert_eq!(scope, ["schemas/root.json"]);

    resolver.lookup("common.json#/definitions/Currency").unwrap();
    assert_eq!(retriever.calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_percent_encoded_fragment() {
    let registry = Registry::new().with_document(
        "root.json",
        json!({"paths": {"/users/{id}": {"type": "string"}}}),
    );
    let resolver = registry.resolver("root.json");
    let resolved = resolver.lookup("#/paths/~1users~1%7Bid%7D").unwrap();
    assert_eq!(resolved.contents, json!({"type": "string"}));
}

#[test]
fn test_unretrievable_document() {
    let (registry, _) = registry_with_retriever();
    let resolver = registry.resolver("schemas/root.json");
    let err = resolver.lookup("missing.json#/definitions/X").err().unwrap();
    assert!(matches!(err, ResolveError::Unretrievable { ref uri, .. } if uri == "schemas/missing.json"));
}

#[test]
fn test_registry_without_retriever() {
    let registry = Registry::new();
    let err = registry.get_or_retrieve("other.json").err().unwrap();
    assert!(err.to_string().contains("no retriever configured"));
}

#[test]
fn test_references_across_documents() {
    let (registry, _) = registry_with_retriever();
    let resolver: Arc<dyn Resolver> = Arc::new(registry.resolver("schemas/root.json"));
    let config = TransformConfig::new(Arc::new(ResolutionCache::new()));
    let schema = json!({
        "type": "object",
        "properties": {
            "price": {"$ref": "common.json#/definitions/Money"},
            "code": {"$ref": "#/definitions/Currency"}
        }
    });
    let result = to_jsonschema(schema, &resolver, &config).unwrap();
    assert_eq!(
        result,
        json!({
            "type": "object",
            "properties": {
                "price": {"$ref": "#/x-moved-schemas/common.json-definitions-Money"},
                "code": {"$ref": "#/x-moved-schemas/-definitions-Currency"}
            },
            "x-moved-schemas": {
                "-definitions-Currency": {"type": "integer"},
                "common.json-definitions-Money": {
                    "type": "object",
                    "properties": {
                        "currency": {
                            "$ref": "#/x-moved-schemas/schemas-common.json-definitions-Currency"
                        }
                    }
                },
                "schemas-common.json-definitions-Currency": {
                    "type": "string",
                    "pattern": "^[A-Z]{3}$"
                }
            }
        })
    );
}
